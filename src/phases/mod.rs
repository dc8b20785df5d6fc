//! KI-050: Phase catalog of the `init` and `reset` workflows.
//!
//! Each phase follows the same shape: cast the run data to the capability it
//! needs, run preflight, fan out over the relevant nodes, return the
//! dispatcher's result.

pub mod container_engine;
pub mod kube_component;
pub mod kubeadm;
pub mod network;
pub mod offline;
pub mod reset;

use crate::core::workflow::Runner;

/// Flags every node-touching phase honours.
pub const CONNECTION_FLAGS: &[&str] = &[
    "jump-server",
    "masters",
    "workers",
    "password",
    "port",
    "user",
    "key",
];

/// `kubei init`: offline package, container engine, kube components, kubeadm.
pub fn init_workflow() -> Runner {
    let mut runner = Runner::new();
    runner.append_phase(offline::phase());
    runner.append_phase(container_engine::phase());
    runner.append_phase(kube_component::phase());
    runner.append_phase(kubeadm::phase());
    runner
}

/// `kubei reset`: tear the cluster down on every node.
pub fn reset_workflow() -> Runner {
    let mut runner = Runner::new();
    runner.append_phase(reset::phase());
    runner
}
