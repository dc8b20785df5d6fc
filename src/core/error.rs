//! KI-004: Error taxonomy for workflow, dispatch, and node execution.
//!
//! Transport and script generation report plain `String` errors; everything
//! that crosses a phase boundary is a `KubeiError`.

use thiserror::Error;

/// Errors surfaced by phases, the workflow runner, and the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KubeiError {
    /// The run data handed to a phase lacks the capability the phase needs.
    #[error("{phase} phase invoked with an invalid run data struct")]
    InvalidRunData { phase: String },

    /// Unknown `type` selector for the network plugin.
    #[error("[network] Unsupported network type: {kind}, supported type: {supported}")]
    UnsupportedNetwork { kind: String, supported: String },

    /// Static configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A skip-set entry or `run_phase` target names no registered phase.
    #[error("unknown phase '{name}', available phases: {available}")]
    UnknownPhase { name: String, available: String },

    /// Two sibling phases share a name.
    #[error("duplicate phase name '{0}'")]
    DuplicatePhase(String),

    /// The runner was asked to run without a data initializer.
    #[error("workflow has no run data initializer")]
    MissingInitializer,

    /// A pre-check failed before any remote mutation.
    #[error("[preflight] {0}")]
    Preflight(String),

    /// Command resolution or remote execution failed on one host.
    #[error("[{host}] [{operation}] {message}")]
    Node {
        host: String,
        operation: String,
        message: String,
    },

    /// Skipped because an earlier unit of the same dispatch failed.
    #[error("[{host}] [{operation}] cancelled after an earlier failure")]
    Cancelled { host: String, operation: String },

    /// A fan-out unit panicked instead of returning.
    #[error("[{host}] worker panicked: {message}")]
    WorkerPanicked { host: String, message: String },
}

impl KubeiError {
    /// Wrap a failure with the node's host identity and the operation name.
    pub fn node(host: &str, operation: &str, message: impl Into<String>) -> Self {
        Self::Node {
            host: host.to_string(),
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Prefix a node error's message with what was being attempted.
    /// Other variants pass through unchanged.
    pub fn context(self, action: &str) -> Self {
        match self {
            Self::Node {
                host,
                operation,
                message,
            } => Self::Node {
                host,
                operation,
                message: format!("{}: {}", action, message),
            },
            other => other,
        }
    }

    /// Whether this error is only the echo of another unit's failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Configuration errors abort the whole invocation and are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidRunData { .. }
                | Self::UnsupportedNetwork { .. }
                | Self::Config(_)
                | Self::UnknownPhase { .. }
                | Self::DuplicatePhase(_)
                | Self::MissingInitializer
        )
    }
}
