//! Generic Linux container kind.

use async_trait::async_trait;
use tracing::{debug, warn};
use wirelab_core::error::LabError;
use wirelab_core::{NodeConfig, Result};

use crate::{DeployContext, DeployedNode, NodeKind};

/// A plain Linux container.
#[derive(Debug, Default)]
pub struct LinuxKind;

#[async_trait]
impl NodeKind for LinuxKind {
    fn kind(&self) -> &'static str {
        "linux"
    }

    fn init(&self, node: &mut NodeConfig) -> Result<()> {
        if node.image.is_none() {
            return Err(LabError::config(format!(
                "node {:?} has no image",
                node.short_name
            )));
        }
        Ok(())
    }

    async fn pre_deploy(&self, node: &NodeConfig, ctx: &DeployContext<'_>) -> Result<()> {
        let dir = ctx.lab_dir.node_dir(&node.short_name);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(node = %node.short_name, dir = %dir.display(), "node directory ready");
        Ok(())
    }

    async fn deploy(&self, node: &NodeConfig, ctx: &DeployContext<'_>) -> Result<DeployedNode> {
        let image = node
            .image
            .as_deref()
            .ok_or_else(|| LabError::config(format!("node {:?} has no image", node.short_name)))?;

        ctx.runtime.pull_image_if_required(image).await?;
        let container_id = ctx.runtime.create_container(node).await?;
        let ns_path = ctx
            .runtime
            .start_container(&container_id, &node.long_name)
            .await?;

        Ok(DeployedNode {
            container_id: Some(container_id),
            ns_path: Some(ns_path),
        })
    }

    async fn post_deploy(&self, node: &NodeConfig, _ctx: &DeployContext<'_>) -> Result<()> {
        // checksums must be computed in software on the management
        // interface, otherwise peers discard veth-delivered frames
        if let Some(ns_path) = &node.ns_path {
            if let Err(err) = wirelab_netlink::ethtool::tx_checksum_off(Some(ns_path), "eth0") {
                warn!(
                    node = %node.short_name,
                    error = %err,
                    "failed to disable TX checksum offloading"
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, node: &NodeConfig, ctx: &DeployContext<'_>) -> Result<()> {
        if let Some(container_id) = &node.container_id {
            ctx.runtime.stop_container(container_id, None).await?;
            ctx.runtime.remove_container(container_id).await?;
        }
        wirelab_netlink::unlink_netns(&node.long_name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_requires_image() {
        let kind = LinuxKind;
        let mut node = NodeConfig {
            short_name: "r1".to_string(),
            ..Default::default()
        };
        assert!(kind.init(&mut node).is_err());

        node.image = Some("alpine:3".to_string());
        assert!(kind.init(&mut node).is_ok());
    }
}
