//! Error types shared across the wirelab crates.
//!
//! This module provides the top-level error enum surfaced to callers of the
//! deployment engine, together with the exit-code mapping used by the CLI.

use thiserror::Error;

/// Result type for lab operations.
pub type Result<T> = std::result::Result<T, LabError>;

/// Errors surfaced by the deployment engine and its collaborators.
#[derive(Debug, Error)]
pub enum LabError {
    /// Invalid topology: unknown kind, duplicate name, schema violation,
    /// endpoint uniqueness violation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The node dependency graph contains a cycle.
    #[error("cyclic dependencies found:\n{0}")]
    Cyclic(String),

    /// A host resource could not be obtained: image missing and not
    /// pullable, network creation failed, insufficient privileges.
    #[error("resource error: {0}")]
    Resource(String),

    /// A failure reported by the container runtime adapter.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A netlink or namespace operation failed.
    #[error("netlink error: {0}")]
    Netlink(String),

    /// The root context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The deploy finished, but one or more nodes or links failed.
    #[error("partial failure: {} item(s) failed: {}", failed.len(), failed.join(", "))]
    Partial {
        /// Names of the nodes and links that failed.
        failed: Vec<String>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabError {
    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Creates a cyclic-dependency error carrying the rendered graph.
    pub fn cyclic(graph: impl Into<String>) -> Self {
        Self::Cyclic(graph.into())
    }

    /// Creates a resource error.
    pub fn resource(reason: impl Into<String>) -> Self {
        Self::Resource(reason.into())
    }

    /// Creates a runtime error.
    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Runtime(reason.into())
    }

    /// Creates a netlink error.
    pub fn netlink(reason: impl Into<String>) -> Self {
        Self::Netlink(reason.into())
    }

    /// Creates a partial-failure error from the failed item names.
    pub fn partial(failed: Vec<String>) -> Self {
        Self::Partial { failed }
    }

    /// Returns true if this error stems from the topology rather than the
    /// host or the runtime.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Cyclic(_))
    }

    /// Returns true if the root context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Maps the error to the process exit code contract:
    /// 1 partial failure, 2 configuration error, 3 runtime unavailable.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Cyclic(_) => 2,
            Self::Runtime(_) | Self::Resource(_) => 3,
            Self::Partial { .. } | Self::Netlink(_) | Self::Cancelled | Self::Io(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LabError::config("duplicate node name \"r1\"");
        assert_eq!(
            err.to_string(),
            "configuration error: duplicate node name \"r1\""
        );

        let err = LabError::partial(vec!["r1".to_string(), "r2:eth1".to_string()]);
        assert_eq!(err.to_string(), "partial failure: 2 item(s) failed: r1, r2:eth1");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LabError::config("x").exit_code(), 2);
        assert_eq!(LabError::cyclic("a -> [ b ]").exit_code(), 2);
        assert_eq!(LabError::runtime("daemon unreachable").exit_code(), 3);
        assert_eq!(LabError::resource("no such image").exit_code(), 3);
        assert_eq!(LabError::partial(vec!["r1".into()]).exit_code(), 1);
        assert_eq!(LabError::Cancelled.exit_code(), 1);
    }

    #[test]
    fn test_is_config() {
        assert!(LabError::config("x").is_config());
        assert!(LabError::cyclic("x").is_config());
        assert!(!LabError::runtime("x").is_config());
    }
}
