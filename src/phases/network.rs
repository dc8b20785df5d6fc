//! KI-054: Network plugin selection and installation.

use crate::core::error::KubeiError;
use crate::core::executor::execute;
use crate::core::rundata::Node;
use crate::core::types::{ClusterConfig, FlannelConfig, InstallType, NetworkPlugin};
use crate::scripts::network;
use tracing::{info, warn};

pub const OPERATION: &str = "kubeadm.network";

/// Install the selected network plugin from `master`.
pub fn apply(master: &Node, cluster: &ClusterConfig) -> Result<(), KubeiError> {
    match cluster.network {
        NetworkPlugin::None => {
            info!("[network] No network plugin selected, skipping");
            Ok(())
        }
        NetworkPlugin::Flannel(ref cfg) => flannel(master, cfg, &cluster.kubeadm.pod_subnet, cluster.install_type()),
        NetworkPlugin::Calico(_) => {
            warn!("[network] calico is not supported yet, skipping network plugin installation");
            Ok(())
        }
    }
}

fn flannel(
    master: &Node,
    cfg: &FlannelConfig,
    pod_subnet: &str,
    install_type: InstallType,
) -> Result<(), KubeiError> {
    info!(host = master.name(), backend = %cfg.backend_type, "[network] Applying flannel");
    execute(master, OPERATION, |_| Ok(network::flannel(cfg, pod_subnet, install_type)))
        .map_err(|e| e.context("Failed to apply flannel"))?;
    info!(host = master.name(), "[network] Successfully applied flannel");
    Ok(())
}
