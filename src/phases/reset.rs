//! KI-056: reset phase. Tear the cluster down on every node.

use super::CONNECTION_FLAGS;
use crate::core::dispatch::dispatch;
use crate::core::error::KubeiError;
use crate::core::executor::execute;
use crate::core::preflight;
use crate::core::rundata::{reset_data, RunData};
use crate::core::workflow::Phase;
use crate::scripts::kubeadm;
use tracing::info;

pub const NAME: &str = "cluster";

pub fn phase() -> Phase {
    Phase::new(NAME)
        .short("Reset the Kubernetes cluster")
        .long("Run kubeadm reset on every node and remove CNI, iptables and kubeconfig state.")
        .inherit_flags(CONNECTION_FLAGS)
        .run(run)
}

fn run(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = reset_data(data, NAME)?;
    preflight::check(&*data)?;

    let domain = data.cluster().kubeadm.api_domain_name();
    dispatch(&data.nodes().all(), data.max_parallel(), |node| {
        info!(host = node.name(), "[reset] Resetting node");
        execute(node, NAME, |_| Ok(kubeadm::reset(domain)))
            .map_err(|e| e.context("Failed to reset node"))?;
        info!(host = node.name(), "[reset] Successfully reset node");
        Ok(())
    })
}
