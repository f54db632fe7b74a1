//! Engine-side node records.
//!
//! The node map is the only mutable state read from outside its owning
//! task: workers write status under the write lock, the link scheduler
//! reads it under the read lock through [`NodeHandle`]. Raw references to
//! the map never leak.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use wirelab_core::{NodeConfig, NodeState};
use wirelab_links::{EndpointKind, LinkNode};
use wirelab_nodes::NodeKind;

/// A node under engine control.
pub struct LabNode {
    /// Resolved configuration; mutable fields are filled during deploy.
    pub config: NodeConfig,
    /// The kind plug-in driving this node's lifecycle.
    pub kind: Arc<dyn NodeKind>,
    /// Current lifecycle state.
    pub state: NodeState,
    /// First error observed, for the final report.
    pub error: Option<String>,
    /// When the worker started this node's deploy work.
    pub deploy_started_at: Option<Instant>,
    /// When the node reached `created`.
    pub created_at: Option<Instant>,
}

impl LabNode {
    /// Creates a node record in the `defined` state.
    pub fn new(config: NodeConfig, kind: Arc<dyn NodeKind>) -> Self {
        Self {
            config,
            kind,
            state: NodeState::Defined,
            error: None,
            deploy_started_at: None,
            created_at: None,
        }
    }
}

/// Shared node map guarded by a reader/writer lock.
pub type NodeMap = Arc<RwLock<HashMap<String, LabNode>>>;

/// Read view of one node for the link layer.
#[derive(Clone)]
pub struct NodeHandle {
    name: String,
    nodes: NodeMap,
}

impl NodeHandle {
    /// Creates a handle for a node in the shared map.
    pub fn new(name: impl Into<String>, nodes: NodeMap) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }
}

impl LinkNode for NodeHandle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn ns_path(&self) -> Option<String> {
        let nodes = self.nodes.read().expect("node map lock poisoned");
        nodes.get(&self.name).and_then(|n| n.config.ns_path.clone())
    }

    fn endpoint_kind(&self) -> EndpointKind {
        let nodes = self.nodes.read().expect("node map lock poisoned");
        match nodes.get(&self.name) {
            Some(node) if !node.kind.is_container() => EndpointKind::Bridge,
            _ => EndpointKind::Container,
        }
    }

    fn is_created(&self) -> bool {
        let nodes = self.nodes.read().expect("node map lock poisoned");
        nodes
            .get(&self.name)
            .map(|n| n.state.is_created())
            .unwrap_or(false)
    }

    fn is_failed(&self) -> bool {
        let nodes = self.nodes.read().expect("node map lock poisoned");
        nodes
            .get(&self.name)
            .map(|n| n.state == NodeState::Failed)
            .unwrap_or(false)
    }
}
