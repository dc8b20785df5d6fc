//! KI-003: Cluster file parsing and validation.
//!
//! Parses kubei.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - At least one master
//! - Hosts are unique across masters and workers
//! - Component versions are non-empty
//! - Control-plane endpoint is `domain:port`, subnets are CIDRs

use super::types::*;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a kubei.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<ClusterConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a kubei.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<ClusterConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &ClusterConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        push(format!("version must be \"1.0\", got \"{}\"", config.version));
    }

    if config.nodes.masters.is_empty() {
        push("at least one master is required".to_string());
    }

    let mut hosts = HashSet::new();
    let mut names = HashSet::new();
    for spec in config.nodes.masters.iter().chain(config.nodes.workers.iter()) {
        if spec.host.trim().is_empty() {
            push("node host must not be empty".to_string());
            continue;
        }
        if !hosts.insert(spec.host.as_str()) {
            push(format!("host '{}' is listed more than once", spec.host));
        }
        if !names.insert(spec.display_name()) && spec.name.is_some() {
            push(format!("node name '{}' is used more than once", spec.display_name()));
        }
        if spec.port == Some(0) {
            push(format!("node '{}' has port 0", spec.display_name()));
        }
    }

    if config.nodes.port == 0 {
        push("nodes.port must not be 0".to_string());
    }
    if config.nodes.user.trim().is_empty() {
        push("nodes.user must not be empty".to_string());
    }

    if config.kubernetes.version.trim().is_empty() {
        push("kubernetes.version must not be empty".to_string());
    }
    if config.container_engine.docker.version.trim().is_empty() {
        push("container_engine.docker.version must not be empty".to_string());
    }

    match config.kubeadm.control_plane_endpoint.rsplit_once(':') {
        Some((domain, port)) if !domain.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => push(format!(
            "kubeadm.control_plane_endpoint must be domain:port, got \"{}\"",
            config.kubeadm.control_plane_endpoint
        )),
    }

    for (field, value) in [
        ("kubeadm.pod_subnet", &config.kubeadm.pod_subnet),
        ("kubeadm.service_subnet", &config.kubeadm.service_subnet),
    ] {
        if !is_cidr(value) {
            push(format!("{} must be a CIDR, got \"{}\"", field, value));
        }
    }

    if let Some(ref path) = config.offline_package {
        if !path.is_file() {
            push(format!("offline package {} does not exist", path.display()));
        }
    }

    if let Some(ref jump) = config.jump_server {
        if jump.host.trim().is_empty() {
            push("jump_server.host must not be empty".to_string());
        }
    }

    errors
}

fn is_cidr(value: &str) -> bool {
    let Some((addr, prefix)) = value.split_once('/') else {
        return false;
    };
    let Ok(addr) = addr.parse::<IpAddr>() else {
        return false;
    };
    let max = if addr.is_ipv4() { 32 } else { 128 };
    prefix.parse::<u8>().map(|p| p <= max).unwrap_or(false)
}
