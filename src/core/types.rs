//! KI-002: Cluster configuration types.
//!
//! Defines the YAML schema for nodes, container engine, Kubernetes components,
//! kubeadm networking, and the network plugin selection. All types derive
//! Serialize/Deserialize so a cluster file can be round-tripped.

use super::error::KubeiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Top-level kubei.yaml
// ============================================================================

/// Root configuration: the desired cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Schema version (must be "1.0")
    #[serde(default = "default_version")]
    pub version: String,

    /// Node inventory and shared connection settings
    #[serde(default)]
    pub nodes: NodesConfig,

    /// Optional bastion all SSH connections go through
    #[serde(default)]
    pub jump_server: Option<JumpServer>,

    /// Container engine settings
    #[serde(default)]
    pub container_engine: ContainerEngine,

    /// kubelet/kubeadm/kubectl settings
    #[serde(default)]
    pub kubernetes: Kubernetes,

    /// kubeadm bootstrap settings
    #[serde(default)]
    pub kubeadm: KubeadmConfig,

    /// Network plugin selection
    #[serde(default)]
    pub network: NetworkPlugin,

    /// Local tarball with packages for air-gapped installs
    #[serde(default)]
    pub offline_package: Option<PathBuf>,

    /// Concurrent nodes per phase (0 = CPU count)
    #[serde(default)]
    pub max_parallel: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            nodes: NodesConfig::default(),
            jump_server: None,
            container_engine: ContainerEngine::default(),
            kubernetes: Kubernetes::default(),
            kubeadm: KubeadmConfig::default(),
            network: NetworkPlugin::default(),
            offline_package: None,
            max_parallel: 0,
        }
    }
}

impl ClusterConfig {
    /// Install type shared by every node of this cluster.
    pub fn install_type(&self) -> InstallType {
        if self.offline_package.is_some() {
            InstallType::Offline
        } else {
            InstallType::Online
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

// ============================================================================
// Nodes
// ============================================================================

/// Node inventory plus connection defaults applied to every entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesConfig {
    /// SSH user
    #[serde(default = "default_user")]
    pub user: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SSH password (uses sshpass)
    #[serde(default)]
    pub password: Option<String>,

    /// Path to SSH private key
    #[serde(default)]
    pub key: Option<String>,

    /// Control-plane nodes; the first one bootstraps the cluster
    #[serde(default)]
    pub masters: Vec<NodeSpec>,

    /// Worker nodes
    #[serde(default)]
    pub workers: Vec<NodeSpec>,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            password: None,
            key: None,
            masters: Vec::new(),
            workers: Vec::new(),
        }
    }
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

/// One node entry. A bare string is shorthand for `{ host: <string> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NodeEntry")]
pub struct NodeSpec {
    /// Address (IP or DNS)
    pub host: String,

    /// Display name used in logs and errors (defaults to host)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub key: Option<String>,
}

impl NodeSpec {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            name: None,
            user: None,
            port: None,
            password: None,
            key: None,
        }
    }

    /// Name used to identify this node in logs and errors.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeEntry {
    Host(String),
    Full {
        host: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        key: Option<String>,
    },
}

impl From<NodeEntry> for NodeSpec {
    fn from(entry: NodeEntry) -> Self {
        match entry {
            NodeEntry::Host(host) => NodeSpec::new(&host),
            NodeEntry::Full {
                host,
                name,
                user,
                port,
                password,
                key,
            } => NodeSpec {
                host,
                name,
                user,
                port,
                password,
                key,
            },
        }
    }
}

/// Bastion host used as an SSH ProxyJump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpServer {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub key: Option<String>,
}

impl JumpServer {
    /// Parse `user@host:port`, `user@host`, `host:port` or `host`.
    pub fn parse(spec: &str) -> Result<Self, KubeiError> {
        let (user, rest) = match spec.split_once('@') {
            Some((u, r)) => (u.to_string(), r),
            None => (default_user(), spec),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| KubeiError::Config(format!("invalid jump server port in '{}'", spec)))?;
                (h.to_string(), port)
            }
            None => (rest.to_string(), default_port()),
        };
        if host.is_empty() || user.is_empty() {
            return Err(KubeiError::Config(format!("invalid jump server '{}'", spec)));
        }
        Ok(Self {
            host,
            port,
            user,
            password: None,
            key: None,
        })
    }
}

/// Node role within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// Package manager detected on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManager {
    Apt,
    Yum,
}

impl PackageManager {
    /// Parse the output of the detection probe.
    pub fn from_probe(output: &str) -> Option<Self> {
        match output.trim() {
            "apt" => Some(Self::Apt),
            "yum" => Some(Self::Yum),
            _ => None,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apt => write!(f, "apt"),
            Self::Yum => write!(f, "yum"),
        }
    }
}

/// Where packages come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallType {
    #[default]
    Online,
    Offline,
}

/// Facts detected on a node once, during preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFacts {
    pub package_manager: PackageManager,
    pub install_type: InstallType,
}

// ============================================================================
// Components
// ============================================================================

/// Container engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerEngine {
    #[serde(default)]
    pub docker: Docker,
}

/// Docker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Docker {
    /// Package version (e.g., "24.0.7")
    #[serde(default = "default_docker_version")]
    pub version: String,

    /// cgroup driver written to daemon.json
    #[serde(default = "default_cgroup_driver")]
    pub cgroup_driver: String,

    /// Registry mirrors written to daemon.json
    #[serde(default)]
    pub registry_mirrors: Vec<String>,

    /// json-file log rotation size
    #[serde(default = "default_log_max_size")]
    pub log_max_size: String,
}

impl Default for Docker {
    fn default() -> Self {
        Self {
            version: default_docker_version(),
            cgroup_driver: default_cgroup_driver(),
            registry_mirrors: Vec::new(),
            log_max_size: default_log_max_size(),
        }
    }
}

fn default_docker_version() -> String {
    "24.0.7".to_string()
}

fn default_cgroup_driver() -> String {
    "systemd".to_string()
}

fn default_log_max_size() -> String {
    "100m".to_string()
}

/// kubelet/kubeadm/kubectl settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kubernetes {
    /// Package and control-plane version (e.g., "1.28.2")
    #[serde(default = "default_kube_version")]
    pub version: String,

    /// Image registry for control-plane images
    #[serde(default)]
    pub image_repository: Option<String>,
}

impl Default for Kubernetes {
    fn default() -> Self {
        Self {
            version: default_kube_version(),
            image_repository: None,
        }
    }
}

fn default_kube_version() -> String {
    "1.28.2".to_string()
}

/// kubeadm bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeadmConfig {
    /// Shared API endpoint, `domain:port`
    #[serde(default = "default_endpoint")]
    pub control_plane_endpoint: String,

    #[serde(default = "default_pod_subnet")]
    pub pod_subnet: String,

    #[serde(default = "default_service_subnet")]
    pub service_subnet: String,

    #[serde(default = "default_dns_domain")]
    pub dns_domain: String,
}

impl Default for KubeadmConfig {
    fn default() -> Self {
        Self {
            control_plane_endpoint: default_endpoint(),
            pod_subnet: default_pod_subnet(),
            service_subnet: default_service_subnet(),
            dns_domain: default_dns_domain(),
        }
    }
}

impl KubeadmConfig {
    /// Domain part of the control-plane endpoint.
    pub fn api_domain_name(&self) -> &str {
        match self.control_plane_endpoint.rsplit_once(':') {
            Some((domain, port)) if port.parse::<u16>().is_ok() => domain,
            _ => &self.control_plane_endpoint,
        }
    }
}

fn default_endpoint() -> String {
    "apiserver.k8s.local:6443".to_string()
}

fn default_pod_subnet() -> String {
    "10.244.0.0/16".to_string()
}

fn default_service_subnet() -> String {
    "10.96.0.0/12".to_string()
}

fn default_dns_domain() -> String {
    "cluster.local".to_string()
}

// ============================================================================
// Network plugin
// ============================================================================

/// Network plugin selectors accepted in configuration and flags.
pub const SUPPORTED_NETWORK_TYPES: &[&str] = &["calico", "flannel", "none"];

/// Selected network plugin, carrying only the payload for its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNetworkPlugin", into = "RawNetworkPlugin")]
pub enum NetworkPlugin {
    None,
    Flannel(FlannelConfig),
    Calico(CalicoConfig),
}

impl Default for NetworkPlugin {
    fn default() -> Self {
        Self::Flannel(FlannelConfig::default())
    }
}

impl NetworkPlugin {
    /// Select a plugin by its `type` tag, keeping only that type's payload.
    pub fn select(
        kind: &str,
        flannel: FlannelConfig,
        calico: CalicoConfig,
    ) -> Result<Self, KubeiError> {
        match kind {
            "none" => Ok(Self::None),
            "flannel" => Ok(Self::Flannel(flannel)),
            "calico" => Ok(Self::Calico(calico)),
            other => Err(KubeiError::UnsupportedNetwork {
                kind: other.to_string(),
                supported: SUPPORTED_NETWORK_TYPES.join(", "),
            }),
        }
    }

    /// The `type` tag of this selection.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Flannel(_) => "flannel",
            Self::Calico(_) => "calico",
        }
    }
}

impl fmt::Display for NetworkPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Wire shape of the network section: a `type` tag plus per-type payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawNetworkPlugin {
    #[serde(rename = "type", default = "default_network_type")]
    kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    flannel: Option<FlannelConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    calico: Option<CalicoConfig>,
}

fn default_network_type() -> String {
    "flannel".to_string()
}

impl TryFrom<RawNetworkPlugin> for NetworkPlugin {
    type Error = KubeiError;

    fn try_from(raw: RawNetworkPlugin) -> Result<Self, Self::Error> {
        NetworkPlugin::select(
            &raw.kind,
            raw.flannel.unwrap_or_default(),
            raw.calico.unwrap_or_default(),
        )
    }
}

impl From<NetworkPlugin> for RawNetworkPlugin {
    fn from(plugin: NetworkPlugin) -> Self {
        let kind = plugin.kind().to_string();
        match plugin {
            NetworkPlugin::None => RawNetworkPlugin {
                kind,
                flannel: None,
                calico: None,
            },
            NetworkPlugin::Flannel(cfg) => RawNetworkPlugin {
                kind,
                flannel: Some(cfg),
                calico: None,
            },
            NetworkPlugin::Calico(cfg) => RawNetworkPlugin {
                kind,
                flannel: None,
                calico: Some(cfg),
            },
        }
    }
}

/// Flannel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlannelConfig {
    /// vxlan or host-gw
    #[serde(default = "default_flannel_backend")]
    pub backend_type: String,

    /// Manifest applied with kubectl
    #[serde(default = "default_flannel_manifest")]
    pub manifest_url: String,

    /// Override for the flannel image
    #[serde(default)]
    pub image: Option<String>,
}

impl Default for FlannelConfig {
    fn default() -> Self {
        Self {
            backend_type: default_flannel_backend(),
            manifest_url: default_flannel_manifest(),
            image: None,
        }
    }
}

fn default_flannel_backend() -> String {
    "vxlan".to_string()
}

fn default_flannel_manifest() -> String {
    "https://github.com/flannel-io/flannel/releases/latest/download/kube-flannel.yml".to_string()
}

/// Calico settings (accepted, not yet installed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalicoConfig {
    #[serde(default = "default_ipip_mode")]
    pub ipip_mode: String,

    #[serde(default = "default_calico_mtu")]
    pub mtu: u32,
}

impl Default for CalicoConfig {
    fn default() -> Self {
        Self {
            ipip_mode: default_ipip_mode(),
            mtu: default_calico_mtu(),
        }
    }
}

fn default_ipip_mode() -> String {
    "Always".to_string()
}

fn default_calico_mtu() -> u32 {
    1440
}

// ============================================================================
// Tests
// ============================================================================
