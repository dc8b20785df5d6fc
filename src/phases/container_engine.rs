//! KI-051: container-engine phase. Install Docker on every node.

use super::CONNECTION_FLAGS;
use crate::core::dispatch::dispatch;
use crate::core::error::KubeiError;
use crate::core::executor::{self, execute};
use crate::core::preflight;
use crate::core::rundata::{init_data, ClusterNodes, RunData};
use crate::core::types::Docker;
use crate::core::workflow::Phase;
use crate::scripts::{container_engine, system};
use tracing::info;

pub const NAME: &str = "container-engine";

pub fn phase() -> Phase {
    Phase::new(NAME)
        .short("Install the container engine")
        .long("Install Docker on all master and worker nodes, write /etc/docker/daemon.json and restart Docker.")
        .inherit_flags(CONNECTION_FLAGS)
        .run(run)
}

fn run(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = init_data(data, NAME)?;
    preflight::check(&*data)?;
    install_docker(data.nodes(), &data.cluster().container_engine.docker, data.max_parallel())
}

/// Install and restart Docker on every node.
pub fn install_docker(nodes: &ClusterNodes, docker: &Docker, max_parallel: usize) -> Result<(), KubeiError> {
    dispatch(&nodes.all(), max_parallel, |node| {
        info!(host = node.name(), "[container-engine] Installing Docker");
        execute(node, NAME, |n| {
            container_engine::docker(executor::facts(n)?, docker)
        })
        .map_err(|e| e.context("Failed to install Docker"))?;

        execute(node, NAME, |_| Ok(system::restart("docker")))
            .map_err(|e| e.context("Failed to restart docker"))?;

        info!(host = node.name(), "[container-engine] Successfully installed Docker");
        Ok(())
    })
}
