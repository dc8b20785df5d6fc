//! KI-032: Preflight. Configuration and reachability checks before mutation.
//!
//! Every phase calls [`check`] first. It validates the static configuration,
//! then probes every node that has no recorded facts yet, detecting its
//! package manager. Facts are recorded once per node and reused by later
//! phases.

use super::dispatch::dispatch;
use super::error::KubeiError;
use super::executor;
use super::parser;
use super::rundata::{ClusterData, Node};
use super::types::{InstallType, NodeFacts, PackageManager};
use tracing::{debug, info};

/// Prints the node's package manager family: apt, yum, or unknown.
pub const PROBE_SCRIPT: &str = "\
if command -v apt-get >/dev/null 2>&1; then echo apt; \
elif command -v yum >/dev/null 2>&1; then echo yum; \
else echo unknown; fi";

/// Validate configuration and detect facts on every node.
pub fn check<D: ClusterData + ?Sized>(data: &D) -> Result<(), KubeiError> {
    let errors = parser::validate_config(data.cluster());
    if !errors.is_empty() {
        let joined = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        return Err(KubeiError::Preflight(joined));
    }

    let nodes = data.nodes();
    if nodes.masters.is_empty() {
        return Err(KubeiError::Preflight("no master nodes".to_string()));
    }

    let pending: Vec<&Node> = nodes.all().into_iter().filter(|n| n.facts().is_none()).collect();
    if pending.is_empty() {
        debug!("facts already detected on all nodes");
        return Ok(());
    }

    let install_type = data.cluster().install_type();
    dispatch(&pending, data.max_parallel(), |node| {
        detect(node, install_type).map(|_| ())
    })
    .map_err(|e| KubeiError::Preflight(e.to_string()))
}

/// Probe one node and record its facts.
pub fn detect(node: &Node, install_type: InstallType) -> Result<NodeFacts, KubeiError> {
    let out = executor::execute(node, "preflight", |_| Ok(PROBE_SCRIPT.to_string()))?;
    let package_manager = PackageManager::from_probe(&out.stdout).ok_or_else(|| {
        KubeiError::node(
            node.name(),
            "preflight",
            format!("unsupported package manager (probe said '{}')", out.stdout.trim()),
        )
    })?;
    let facts = *node.record_facts(NodeFacts {
        package_manager,
        install_type,
    });
    info!(host = node.name(), package_manager = %facts.package_manager, "[preflight] node ready");
    Ok(facts)
}
