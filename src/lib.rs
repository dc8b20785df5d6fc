//! kubei: provision highly available Kubernetes clusters with kubeadm.
//!
//! Phase workflows (`init`, `reset`) run against every node over SSH, fanning
//! per-node work out to a bounded pool of workers.

pub mod cli;
pub mod core;
pub mod logging;
pub mod phases;
pub mod scripts;
pub mod transport;
