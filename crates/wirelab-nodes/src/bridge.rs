//! Pre-existing host bridge kind.
//!
//! A `bridge` node maps to no container: its endpoints are enslaved to an
//! existing Linux bridge in the host namespace, named by the node's
//! short name. Deploy only verifies the bridge exists.

use async_trait::async_trait;
use tracing::debug;
use wirelab_core::error::LabError;
use wirelab_core::{NodeConfig, Result};

use crate::{DeployContext, DeployedNode, NodeKind};

/// An existing Linux bridge on the host.
#[derive(Debug, Default)]
pub struct BridgeKind;

#[async_trait]
impl NodeKind for BridgeKind {
    fn kind(&self) -> &'static str {
        "bridge"
    }

    fn is_container(&self) -> bool {
        false
    }

    fn init(&self, _node: &mut NodeConfig) -> Result<()> {
        Ok(())
    }

    async fn pre_deploy(&self, _node: &NodeConfig, _ctx: &DeployContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn deploy(&self, node: &NodeConfig, _ctx: &DeployContext<'_>) -> Result<DeployedNode> {
        let handle = wirelab_netlink::ns_handle(None).map_err(LabError::from)?;
        wirelab_netlink::veth::link_index(&handle, &node.short_name)
            .await
            .map_err(|_| {
                LabError::resource(format!(
                    "bridge {:?} does not exist on the host",
                    node.short_name
                ))
            })?;
        debug!(bridge = %node.short_name, "host bridge verified");
        Ok(DeployedNode::default())
    }

    async fn post_deploy(&self, _node: &NodeConfig, _ctx: &DeployContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, node: &NodeConfig, _ctx: &DeployContext<'_>) -> Result<()> {
        // the bridge belongs to the operator, never remove it
        debug!(bridge = %node.short_name, "leaving host bridge in place");
        Ok(())
    }
}
