//! Deploy result reporting.

use serde::{Deserialize, Serialize};
use wirelab_core::error::{LabError, Result};
use wirelab_core::NodeState;

/// Per-node row of the final status table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node short-name.
    pub name: String,
    /// Lab-prefixed container name.
    pub long_name: String,
    /// Node kind.
    pub kind: String,
    /// Image reference.
    pub image: Option<String>,
    /// Final lifecycle state.
    pub state: NodeState,
    /// Management IPv4 address.
    pub ipv4: Option<String>,
    /// Management IPv6 address.
    pub ipv6: Option<String>,
    /// Container ID (short form).
    pub container_id: Option<String>,
    /// First error observed, for failed nodes.
    pub error: Option<String>,
    /// Milliseconds from engine start to the beginning of this node's
    /// deploy work.
    pub deploy_started_ms: Option<u64>,
    /// Milliseconds from engine start to reaching `created`.
    pub created_ms: Option<u64>,
}

/// Aggregate result of a deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    /// Lab name.
    pub lab: String,
    /// Per-node rows, sorted by name.
    pub nodes: Vec<NodeReport>,
    /// Names of nodes and links that failed.
    pub failed: Vec<String>,
    /// Links whose endpoint nodes failed terminally; reported, not fatal.
    pub orphaned_links: Vec<String>,
}

impl DeployReport {
    /// Returns true if any node or link failed.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Converts the report into a `Partial` error when anything failed.
    pub fn ensure_success(&self) -> Result<()> {
        if self.has_failures() {
            Err(LabError::partial(self.failed.clone()))
        } else {
            Ok(())
        }
    }

    /// Looks up a node row by short name.
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_failure_mapping() {
        let report = DeployReport {
            lab: "demo".to_string(),
            nodes: Vec::new(),
            failed: vec!["r1".to_string()],
            orphaned_links: Vec::new(),
        };
        assert!(report.has_failures());
        let err = report.ensure_success().unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let clean = DeployReport {
            lab: "demo".to_string(),
            nodes: Vec::new(),
            failed: Vec::new(),
            orphaned_links: Vec::new(),
        };
        assert!(clean.ensure_success().is_ok());
    }
}
