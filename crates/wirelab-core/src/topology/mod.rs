//! Topology definition types.
//!
//! A topology file names a lab, an optional management-network descriptor,
//! per-kind and global defaults, the node map and the ordered link list.
//! The parsed topology is immutable during deploy; per-node runtime state
//! lives in the engine, not here.

mod link;
mod mgmt;
mod node;

pub use link::{
    LinkDescriptor, LinkState, ParsedEndpoint, DEFAULT_LINK_MTU, HOST_PSEUDO_NODE,
    MACVLAN_PSEUDO_NODE, MGMT_NET_PSEUDO_NODE,
};
pub use mgmt::MgmtNet;
pub use node::{NodeConfig, NodeDefaults, NodeState, NetworkMode, Phase};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};

/// Root object of a topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    /// Unique lab name.
    pub name: String,

    /// Management network descriptor.
    #[serde(default)]
    pub mgmt: MgmtNet,

    /// Node and link definitions.
    pub topology: TopologySection,
}

/// The `topology` section of the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologySection {
    /// Per-kind default overrides, applied before the global defaults.
    #[serde(default)]
    pub kinds: HashMap<String, NodeDefaults>,

    /// Global defaults, applied after kind defaults.
    #[serde(default)]
    pub defaults: NodeDefaults,

    /// Node short-name to configuration mapping.
    #[serde(default)]
    pub nodes: HashMap<String, NodeConfig>,

    /// Ordered list of link descriptors.
    #[serde(default)]
    pub links: Vec<LinkDescriptor>,
}

impl Topology {
    /// Returns the lab-prefixed long name for a node short-name.
    pub fn long_name(&self, short: &str) -> String {
        format!("clab-{}-{}", self.name, short)
    }

    /// Returns the number of nodes in the topology.
    pub fn node_count(&self) -> usize {
        self.topology.nodes.len()
    }

    /// Returns the number of links in the topology.
    pub fn link_count(&self) -> usize {
        self.topology.links.len()
    }

    /// Merges kind and global defaults into every node config, fills in the
    /// lab-scoped fields (long name, index, MAC, labels) and validates the
    /// result. Called once by the engine before scheduling.
    pub fn resolve(&mut self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LabError::config("lab name must not be empty"));
        }

        let kinds = self.topology.kinds.clone();
        let defaults = self.topology.defaults.clone();

        let mut names: Vec<String> = self.topology.nodes.keys().cloned().collect();
        names.sort();

        for (index, short) in names.iter().enumerate() {
            let long_name = self.long_name(short);
            let node = self
                .topology
                .nodes
                .get_mut(short)
                .expect("node present by construction");

            node.short_name = short.clone();
            node.long_name = long_name;
            node.index = Some(index);

            // kind defaults first, then global defaults fill the remaining gaps
            if node.kind.is_empty() {
                node.kind = defaults.kind.clone().unwrap_or_else(|| "linux".to_string());
            }
            if let Some(kind_defaults) = kinds.get(&node.kind) {
                node.apply_defaults(kind_defaults);
            }
            node.apply_defaults(&defaults);

            if node.mac_address.is_none() {
                node.mac_address = Some(crate::mac::generate());
            }

            node.labels
                .insert(crate::labels::LAB_LABEL.to_string(), self.name.clone());
            node.labels
                .insert(crate::labels::NODE_NAME_LABEL.to_string(), short.clone());

            node.validate()?;
        }

        // wait-for entries ("node" or "node:phase") must reference known
        // nodes
        for (short, node) in &self.topology.nodes {
            for dep in &node.wait_for {
                let dep_name = dep.split_once(':').map(|(n, _)| n).unwrap_or(dep);
                if !self.topology.nodes.contains_key(dep_name) {
                    return Err(LabError::config(format!(
                        "node {:?} waits for unknown node {:?}",
                        short, dep_name
                    )));
                }
            }
        }

        for link in &self.topology.links {
            link.validate()?;
        }

        Ok(())
    }

    /// Returns the short names of nodes with a static management IP.
    pub fn static_ip_nodes(&self) -> Vec<&str> {
        self.topology
            .nodes
            .iter()
            .filter(|(_, n)| n.has_static_mgmt_ip())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Returns the short names of nodes without a static management IP.
    pub fn dynamic_ip_nodes(&self) -> Vec<&str> {
        self.topology
            .nodes
            .iter()
            .filter(|(_, n)| !n.has_static_mgmt_ip())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
