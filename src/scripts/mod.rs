//! KI-040: Command text. Shell scripts for each provisioning step.
//!
//! Every function returns the complete script for one remote call, or an
//! error when the node's facts do not support the requested step. Values
//! from configuration are always single-quoted through
//! [`crate::transport::quote`].

pub mod container_engine;
pub mod kube_component;
pub mod kubeadm;
pub mod network;
pub mod system;

/// Where the offline package is unpacked on every node.
pub const OFFLINE_DIR: &str = "/opt/kubei/offline";

/// Prefix shared by every generated script.
pub(crate) const STRICT: &str = "set -euo pipefail";
