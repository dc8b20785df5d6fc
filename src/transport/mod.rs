//! KI-010/011: Remote-command channel for local and SSH execution.

pub mod local;
pub mod ssh;

use crate::core::types::{JumpServer, NodeSpec};
use std::path::Path;

/// Output from executing a script on a target.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A channel that runs shell scripts on one host.
///
/// Each node owns exactly one channel and never calls it from two units at once.
pub trait Transport: Send {
    /// Run a script to completion. `Err` means the script could not be run at
    /// all; a non-zero exit is reported through `ExecOutput`.
    fn exec(&mut self, script: &str) -> Result<ExecOutput, String>;

    /// Copy a local file to `remote` on the target.
    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), String>;

    /// Tear down any persistent connection.
    fn close(&mut self) {}
}

/// Fully-resolved connection settings for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub key: Option<String>,
    pub jump: Option<JumpServer>,
}

impl HostInfo {
    /// Resolve a node entry against the shared connection defaults.
    pub fn resolve(
        spec: &NodeSpec,
        user: &str,
        port: u16,
        password: Option<&str>,
        key: Option<&str>,
        jump: Option<&JumpServer>,
    ) -> Self {
        Self {
            host: spec.host.clone(),
            port: spec.port.unwrap_or(port),
            user: spec.user.clone().unwrap_or_else(|| user.to_string()),
            password: spec.password.clone().or_else(|| password.map(str::to_string)),
            key: spec.key.clone().or_else(|| key.map(str::to_string)),
            jump: jump.cloned(),
        }
    }
}

/// Open a channel for a host: loopback addresses run locally, everything else
/// goes over SSH.
pub fn connect(info: &HostInfo) -> Box<dyn Transport> {
    if info.jump.is_none() && is_local_addr(&info.host) {
        Box::new(local::LocalTransport)
    } else {
        Box::new(ssh::SshTransport::new(info.clone()))
    }
}

/// Check if an address is this machine.
fn is_local_addr(addr: &str) -> bool {
    if addr == "127.0.0.1" || addr == "localhost" || addr == "::1" {
        return true;
    }
    if let Ok(hostname) = std::fs::read_to_string("/etc/hostname") {
        if addr == hostname.trim() {
            return true;
        }
    }
    false
}

/// Single-quote a value for safe interpolation into a shell script.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
