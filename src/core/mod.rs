//! Core cluster logic: types, parsing, workflow runner, run data, dispatch.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod parser;
pub mod preflight;
pub mod rundata;
pub mod types;
pub mod workflow;
