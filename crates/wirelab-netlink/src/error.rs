//! Error types for netlink and namespace operations.

use thiserror::Error;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, NetlinkError>;

/// Errors raised by the netlink helper.
#[derive(Debug, Error)]
pub enum NetlinkError {
    /// A link with the given name does not exist in the target namespace.
    #[error("link not found: {0}")]
    LinkNotFound(String),

    /// Unknown macvlan mode string.
    #[error("unknown macvlan mode {0:?}")]
    UnknownMacvlanMode(String),

    /// Invalid netem parameter combination.
    #[error("invalid netem parameters: {0}")]
    InvalidNetem(String),

    /// A `tc` invocation failed.
    #[error("tc failed: {0}")]
    Tc(String),

    /// An auxiliary host command failed.
    #[error("command failed: {0}")]
    Command(String),

    /// Netlink protocol error.
    #[error("netlink error: {0}")]
    Netlink(#[from] rtnetlink::Error),

    /// System call error.
    #[error("system call error: {0}")]
    Nix(#[from] nix::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetlinkError {
    /// Returns true if the error means "no such interface".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::LinkNotFound(_))
    }
}

impl From<NetlinkError> for wirelab_core::LabError {
    fn from(err: NetlinkError) -> Self {
        wirelab_core::LabError::Netlink(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicate() {
        assert!(NetlinkError::LinkNotFound("eth9".into()).is_not_found());
        assert!(!NetlinkError::Tc("x".into()).is_not_found());
    }

    #[test]
    fn test_converts_to_lab_error() {
        let err: wirelab_core::LabError = NetlinkError::LinkNotFound("eth9".into()).into();
        assert_eq!(err.to_string(), "netlink error: link not found: eth9");
    }
}
