//! KI-031: Node executor. The single remote call made by one fan-out unit.
//!
//! resolve command for the node's facts → run over the node's channel →
//! annotate any failure with host and operation. Cancellation is decided by
//! the dispatcher before a unit starts, never between two remote calls.

use super::error::KubeiError;
use super::rundata::Node;
use super::types::NodeFacts;
use crate::transport::ExecOutput;
use std::path::Path;
use tracing::{debug, trace};

/// Run the command produced by `build` on `node`.
///
/// Fails with a host-annotated `Node` error if the command cannot be
/// resolved, cannot be delivered, or exits non-zero.
pub fn execute<F>(
    node: &Node,
    operation: &str,
    build: F,
) -> Result<ExecOutput, KubeiError>
where
    F: FnOnce(&Node) -> Result<String, String>,
{
    let script = build(node).map_err(|e| {
        KubeiError::node(node.name(), operation, format!("cannot resolve command: {}", e))
    })?;

    debug!(host = node.name(), operation, "running remote command");
    trace!(host = node.name(), operation, script = %script);

    let out = node
        .run(&script)
        .map_err(|e| KubeiError::node(node.name(), operation, format!("transport error: {}", e)))?;

    if !out.success() {
        return Err(KubeiError::node(
            node.name(),
            operation,
            format!("exit code {}: {}", out.exit_code, failure_detail(&out)),
        ));
    }
    Ok(out)
}

/// Copy a local file to `node`, with the same error annotation as [`execute`].
pub fn upload(node: &Node, operation: &str, local: &Path, remote: &str) -> Result<(), KubeiError> {
    debug!(host = node.name(), operation, file = %local.display(), remote, "uploading");
    node.upload(local, remote)
        .map_err(|e| KubeiError::node(node.name(), operation, format!("transport error: {}", e)))
}

/// Facts detected by preflight, required by package-manager dependent scripts.
pub fn facts(node: &Node) -> Result<&NodeFacts, String> {
    node.facts()
        .ok_or_else(|| format!("facts for {} not detected; preflight did not run", node.name()))
}

/// Prefer stderr; fall back to the tail of stdout.
fn failure_detail(out: &ExecOutput) -> String {
    let stderr = out.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = out.stdout.trim();
    let lines: Vec<&str> = stdout.lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}
