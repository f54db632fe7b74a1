//! Node kind plug-ins.
//!
//! Each node kind supplies defaults and the lifecycle hooks the engine
//! drives: `init` during resolution, then `pre_deploy`, `deploy`,
//! `post_deploy` and `delete`. The registry maps kind strings to
//! constructors; it is populated once and read-only thereafter.

pub mod bridge;
pub mod linux;

pub use bridge::BridgeKind;
pub use linux::LinuxKind;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use wirelab_core::{LabDirectory, MgmtNet, NodeConfig, Result};
use wirelab_runtime::ContainerRuntime;

/// Context handed to every lifecycle hook.
pub struct DeployContext<'a> {
    /// Runtime adapter.
    pub runtime: &'a dyn ContainerRuntime,
    /// Lab state directory.
    pub lab_dir: &'a LabDirectory,
    /// Management network, enriched with bridge and gateways.
    pub mgmt: &'a MgmtNet,
}

/// What `deploy` produced for a node.
#[derive(Debug, Clone, Default)]
pub struct DeployedNode {
    /// Container ID; `None` for kinds that create no container.
    pub container_id: Option<String>,
    /// Network namespace path of the started container.
    pub ns_path: Option<String>,
}

/// Lifecycle hooks of a node kind.
#[async_trait]
pub trait NodeKind: Send + Sync {
    /// Kind string as used in the topology file.
    fn kind(&self) -> &'static str;

    /// Returns false for kinds that map to no container (e.g. a
    /// pre-existing host bridge).
    fn is_container(&self) -> bool {
        true
    }

    /// Fills kind-specific defaults into the node config during
    /// resolution.
    fn init(&self, node: &mut NodeConfig) -> Result<()>;

    /// Prepares per-node state on disk before the container exists.
    async fn pre_deploy(&self, node: &NodeConfig, ctx: &DeployContext<'_>) -> Result<()>;

    /// Creates and starts the node.
    async fn deploy(&self, node: &NodeConfig, ctx: &DeployContext<'_>) -> Result<DeployedNode>;

    /// Kind-specific tuning once the container runs.
    async fn post_deploy(&self, node: &NodeConfig, ctx: &DeployContext<'_>) -> Result<()>;

    /// Stops and removes the node.
    async fn delete(&self, node: &NodeConfig, ctx: &DeployContext<'_>) -> Result<()>;
}

type KindCtor = fn() -> Arc<dyn NodeKind>;

static REGISTRY: Lazy<HashMap<&'static str, KindCtor>> = Lazy::new(|| {
    let mut kinds: HashMap<&'static str, KindCtor> = HashMap::new();
    kinds.insert("linux", || Arc::new(LinuxKind) as Arc<dyn NodeKind>);
    kinds.insert("bridge", || Arc::new(BridgeKind) as Arc<dyn NodeKind>);
    kinds
});

/// Instantiates the plug-in for a kind string.
pub fn new_kind(kind: &str) -> Option<Arc<dyn NodeKind>> {
    REGISTRY.get(kind).map(|ctor| ctor())
}

/// Returns the registered kind strings.
pub fn registered_kinds() -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = REGISTRY.keys().copied().collect();
    kinds.sort_unstable();
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contents() {
        assert_eq!(registered_kinds(), vec!["bridge", "linux"]);
        assert!(new_kind("linux").is_some());
        assert!(new_kind("bridge").is_some());
        assert!(new_kind("srlinux").is_none());
    }

    #[test]
    fn test_kind_identity() {
        assert_eq!(new_kind("linux").unwrap().kind(), "linux");
        assert!(new_kind("linux").unwrap().is_container());
        assert!(!new_kind("bridge").unwrap().is_container());
    }
}
