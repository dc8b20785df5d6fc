//! KI-020: Run data. The per-invocation context shared by every phase.
//!
//! A run data value owns the node set and all configuration. Phases never see
//! the concrete type: they ask for the capability they need (`InitData`,
//! `ResetData`) and get `None` when the run data does not provide it.

use super::error::KubeiError;
use super::types::{ClusterConfig, NodeFacts, Role};
use crate::transport::{self, ExecOutput, HostInfo, Transport};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

// ============================================================================
// Nodes
// ============================================================================

/// One managed host and its exclusively-owned remote-command channel.
pub struct Node {
    name: String,
    role: Role,
    info: HostInfo,
    facts: OnceLock<NodeFacts>,
    channel: Mutex<Box<dyn Transport>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("host", &self.info.host)
            .field("facts", &self.facts.get())
            .finish()
    }
}

impl Node {
    /// Create a node whose channel is opened from its connection info.
    pub fn connect(name: &str, role: Role, info: HostInfo) -> Self {
        let channel = transport::connect(&info);
        Self::with_transport(name, role, info, channel)
    }

    /// Create a node over an already-built channel.
    pub fn with_transport(name: &str, role: Role, info: HostInfo, channel: Box<dyn Transport>) -> Self {
        Self {
            name: name.to_string(),
            role,
            info,
            facts: OnceLock::new(),
            channel: Mutex::new(channel),
        }
    }

    /// Identity used in logs and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network address.
    pub fn host(&self) -> &str {
        &self.info.host
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn info(&self) -> &HostInfo {
        &self.info
    }

    /// Facts recorded by preflight, if detection already ran.
    pub fn facts(&self) -> Option<&NodeFacts> {
        self.facts.get()
    }

    /// Record detected facts. Later calls keep the first value.
    pub fn record_facts(&self, facts: NodeFacts) -> &NodeFacts {
        self.facts.get_or_init(|| facts)
    }

    /// Run a script over this node's channel.
    pub fn run(&self, script: &str) -> Result<ExecOutput, String> {
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| format!("channel to {} is poisoned", self.name))?;
        channel.exec(script)
    }

    /// Copy a local file to the node.
    pub fn upload(&self, local: &Path, remote: &str) -> Result<(), String> {
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| format!("channel to {} is poisoned", self.name))?;
        channel.upload(local, remote)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Ok(channel) = self.channel.get_mut() {
            channel.close();
        }
    }
}

/// Control-plane and worker nodes of one cluster.
#[derive(Debug, Default)]
pub struct ClusterNodes {
    pub masters: Vec<Node>,
    pub workers: Vec<Node>,
}

impl ClusterNodes {
    /// Build nodes from configuration, opening one channel per host.
    pub fn from_config(config: &ClusterConfig) -> Self {
        let n = &config.nodes;
        let build = |role: Role, specs: &[super::types::NodeSpec]| -> Vec<Node> {
            specs
                .iter()
                .map(|spec| {
                    let info = HostInfo::resolve(
                        spec,
                        &n.user,
                        n.port,
                        n.password.as_deref(),
                        n.key.as_deref(),
                        config.jump_server.as_ref(),
                    );
                    Node::connect(spec.display_name(), role, info)
                })
                .collect()
        };
        Self {
            masters: build(Role::Master, &n.masters),
            workers: build(Role::Worker, &n.workers),
        }
    }

    /// Every node, masters first.
    pub fn all(&self) -> Vec<&Node> {
        self.masters.iter().chain(self.workers.iter()).collect()
    }

    /// The master that bootstraps the cluster.
    pub fn first_master(&self) -> Option<&Node> {
        self.masters.first()
    }

    /// Masters that join an existing control plane.
    pub fn other_masters(&self) -> Vec<&Node> {
        self.masters.iter().skip(1).collect()
    }

    pub fn workers(&self) -> Vec<&Node> {
        self.workers.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.masters.len() + self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Join information captured from the bootstrap master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInfo {
    /// `kubeadm join <endpoint> --token … --discovery-token-ca-cert-hash …`
    pub worker_command: String,
    /// Key that lets additional masters download control-plane certificates.
    pub certificate_key: String,
}

impl JoinInfo {
    /// Join command for an additional control-plane node.
    pub fn control_plane_command(&self) -> String {
        format!(
            "{} --control-plane --certificate-key {}",
            self.worker_command, self.certificate_key
        )
    }
}

/// Base trait for everything a runner can hand to a phase.
///
/// The `as_*` methods are the safe casts phases use at their boundary.
pub trait RunData {
    fn as_init(&mut self) -> Option<&mut dyn InitData> {
        None
    }

    fn as_reset(&mut self) -> Option<&mut dyn ResetData> {
        None
    }
}

/// Read access shared by all lifecycle workflows.
pub trait ClusterData {
    fn cluster(&self) -> &ClusterConfig;
    fn nodes(&self) -> &ClusterNodes;

    /// Concurrency cap for fan-out (0 = CPU count).
    fn max_parallel(&self) -> usize {
        self.cluster().max_parallel
    }
}

/// Capability required by `init` phases.
pub trait InitData: ClusterData {
    fn join_info(&self) -> Option<&JoinInfo>;
    fn set_join_info(&mut self, info: JoinInfo);
}

/// Capability required by `reset` phases.
pub trait ResetData: ClusterData {}

/// Cast run data to the init capability or fail with a configuration error.
pub fn init_data<'a>(data: &'a mut dyn RunData, phase: &str) -> Result<&'a mut dyn InitData, KubeiError> {
    data.as_init().ok_or_else(|| KubeiError::InvalidRunData {
        phase: phase.to_string(),
    })
}

/// Cast run data to the reset capability or fail with a configuration error.
pub fn reset_data<'a>(data: &'a mut dyn RunData, phase: &str) -> Result<&'a mut dyn ResetData, KubeiError> {
    data.as_reset().ok_or_else(|| KubeiError::InvalidRunData {
        phase: phase.to_string(),
    })
}

// ============================================================================
// Concrete run data
// ============================================================================

/// Run data of `kubei init`.
#[derive(Debug)]
pub struct InitContext {
    cluster: ClusterConfig,
    nodes: ClusterNodes,
    join: Option<JoinInfo>,
}

impl InitContext {
    pub fn new(cluster: ClusterConfig, nodes: ClusterNodes) -> Self {
        Self {
            cluster,
            nodes,
            join: None,
        }
    }
}

impl RunData for InitContext {
    fn as_init(&mut self) -> Option<&mut dyn InitData> {
        Some(self)
    }
}

impl ClusterData for InitContext {
    fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    fn nodes(&self) -> &ClusterNodes {
        &self.nodes
    }
}

impl InitData for InitContext {
    fn join_info(&self) -> Option<&JoinInfo> {
        self.join.as_ref()
    }

    fn set_join_info(&mut self, info: JoinInfo) {
        self.join = Some(info);
    }
}

/// Run data of `kubei reset`.
#[derive(Debug)]
pub struct ResetContext {
    cluster: ClusterConfig,
    nodes: ClusterNodes,
}

impl ResetContext {
    pub fn new(cluster: ClusterConfig, nodes: ClusterNodes) -> Self {
        Self { cluster, nodes }
    }
}

impl RunData for ResetContext {
    fn as_reset(&mut self) -> Option<&mut dyn ResetData> {
        Some(self)
    }
}

impl ClusterData for ResetContext {
    fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    fn nodes(&self) -> &ClusterNodes {
        &self.nodes
    }
}

impl ResetData for ResetContext {}
