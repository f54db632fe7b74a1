//! Link-side view of nodes.
//!
//! Links do not own nodes; they reference them through the [`LinkNode`]
//! trait, which the engine implements for managed containers and which
//! the pseudo-nodes below implement for the host namespace, Linux
//! bridges and macvlan parents.

use std::sync::Arc;

/// How an endpoint's interface is treated once it lands in the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Interface lives in a container's network namespace.
    Container,
    /// Interface is enslaved to a Linux bridge in the host namespace.
    Bridge,
    /// Interface stays in the host namespace.
    Host,
}

/// A node as seen by the link layer.
pub trait LinkNode: Send + Sync {
    /// Node short-name; for bridge nodes this is the bridge name.
    fn name(&self) -> String;

    /// Network namespace path, or `None` for the host namespace.
    fn ns_path(&self) -> Option<String>;

    /// How endpoints on this node are wired.
    fn endpoint_kind(&self) -> EndpointKind;

    /// Returns true once the node reached the `created` state. Links are
    /// only dispatched when both endpoint nodes report true.
    fn is_created(&self) -> bool;

    /// Returns true if the node failed terminally; links on such nodes
    /// are orphaned, not retried.
    fn is_failed(&self) -> bool {
        false
    }
}

/// The reserved `host` pseudo-node: endpoints stay in the host namespace.
#[derive(Debug, Default)]
pub struct HostLinkNode;

impl LinkNode for HostLinkNode {
    fn name(&self) -> String {
        wirelab_core::topology::HOST_PSEUDO_NODE.to_string()
    }

    fn ns_path(&self) -> Option<String> {
        None
    }

    fn endpoint_kind(&self) -> EndpointKind {
        EndpointKind::Host
    }

    fn is_created(&self) -> bool {
        true
    }
}

/// A Linux bridge in the host namespace, used for `mgmt-net` endpoints
/// and for `bridge`-kind nodes.
#[derive(Debug)]
pub struct BridgeLinkNode {
    bridge: String,
}

impl BridgeLinkNode {
    /// Creates a bridge pseudo-node for the named bridge.
    pub fn new(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
        }
    }
}

impl LinkNode for BridgeLinkNode {
    fn name(&self) -> String {
        self.bridge.clone()
    }

    fn ns_path(&self) -> Option<String> {
        None
    }

    fn endpoint_kind(&self) -> EndpointKind {
        EndpointKind::Bridge
    }

    fn is_created(&self) -> bool {
        true
    }
}

/// Convenience alias for shared link-node handles.
pub type LinkNodeRef = Arc<dyn LinkNode>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_pseudo_node() {
        let node = HostLinkNode;
        assert_eq!(node.name(), "host");
        assert_eq!(node.ns_path(), None);
        assert_eq!(node.endpoint_kind(), EndpointKind::Host);
        assert!(node.is_created());
        assert!(!node.is_failed());
    }

    #[test]
    fn test_bridge_pseudo_node() {
        let node = BridgeLinkNode::new("br-mgmt");
        assert_eq!(node.name(), "br-mgmt");
        assert_eq!(node.endpoint_kind(), EndpointKind::Bridge);
        assert!(node.is_created());
    }
}
