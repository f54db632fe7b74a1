//! The destroy path.
//!
//! Reverse of deploy, best-effort throughout: stop and remove containers
//! (concurrent lane, with a serial lane for runtimes that cannot remove
//! in parallel), sweep link removal, drop netns symlinks and hosts
//! entries, and delete the management network unless it is preserved or
//! was reused. Every error is logged and the sweep continues; a second
//! destroy of the same lab is a no-op at the runtime layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use wirelab_core::error::Result;
use wirelab_core::NodeState;
use wirelab_links::ResolveParams;
use wirelab_runtime::{ContainerRecord, ContainerRuntime, ListFilter};

use crate::deploy::Engine;
use crate::hostsfile;

/// Grace period for container stop during destroy.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl Engine {
    /// Tears the lab down.
    pub async fn destroy(&self) -> Result<()> {
        info!(lab = %self.topo.name, "destroying lab");

        let records = self
            .runtime
            .list_containers(&[ListFilter::label(
                wirelab_core::labels::LAB_LABEL,
                &self.topo.name,
            )])
            .await?;

        if records.is_empty() {
            debug!(lab = %self.topo.name, "no lab containers found");
        }

        if self.runtime.is_serial() {
            for record in &records {
                remove_one(&self.runtime, record, self.opts.graceful).await;
            }
        } else {
            let mut tasks = JoinSet::new();
            for record in records.clone() {
                let runtime = self.runtime.clone();
                let graceful = self.opts.graceful;
                tasks.spawn(async move {
                    remove_one(&runtime, &record, graceful).await;
                });
            }
            while tasks.join_next().await.is_some() {}
        }

        self.remove_links().await;

        for name in self.topo.topology.nodes.keys() {
            let long_name = self.topo.long_name(name);
            if let Err(err) = wirelab_netlink::unlink_netns(&long_name) {
                warn!(node = %name, error = %err, "failed to remove netns symlink");
            }
        }

        if let Err(err) = hostsfile::remove_entries(&self.opts.hosts_file, &self.topo.name) {
            warn!(error = %err, "failed to clean hosts file");
        }

        if self.opts.keep_mgmt_net {
            debug!("management network preserved on request");
        } else {
            let mgmt = self.mgmt.lock().expect("mgmt lock poisoned").clone();
            if let Err(err) = self.runtime.delete_network(&mgmt).await {
                warn!(network = %mgmt.network, error = %err, "failed to remove management network");
            }
        }

        {
            let mut nodes = self.nodes.write().expect("node map lock poisoned");
            for node in nodes.values_mut() {
                node.state = NodeState::Removed;
                node.config.container_id = None;
                node.config.ns_path = None;
            }
        }

        info!(lab = %self.topo.name, "lab destroyed");
        Ok(())
    }

    /// Sweeps link removal. For a cold destroy the links were never
    /// resolved in this process; they are resolved here so host-side
    /// interfaces get cleaned up, while container-side interfaces die
    /// with their namespaces.
    async fn remove_links(&self) {
        let links = {
            let held = self.links.lock().expect("links lock poisoned");
            if !held.is_empty() {
                held.clone()
            } else {
                let handles = self.link_node_handles();
                let mgmt = self.mgmt.lock().expect("mgmt lock poisoned").clone();
                let params = ResolveParams {
                    nodes: &handles,
                    mgmt_bridge: mgmt.bridge.as_deref().unwrap_or(""),
                    wire: self.wire.clone(),
                };
                match wirelab_links::resolve_links(&self.topo.topology.links, &params) {
                    Ok(links) => links,
                    Err(err) => {
                        warn!(error = %err, "could not resolve links for cleanup");
                        return;
                    }
                }
            }
        };

        for link in links {
            if let Err(err) = link.remove().await {
                warn!(link = %link, error = %err, "failed to remove link");
            }
        }
    }
}

async fn remove_one(runtime: &Arc<dyn ContainerRuntime>, record: &ContainerRecord, graceful: bool) {
    let name = record
        .names
        .first()
        .map(|s| s.as_str())
        .unwrap_or(record.id.as_str());

    if graceful {
        if let Err(err) = runtime.stop_container(&record.id, Some(STOP_TIMEOUT)).await {
            warn!(container = %name, error = %err, "failed to stop container");
        }
    }
    if let Err(err) = runtime.remove_container(&record.id).await {
        warn!(container = %name, error = %err, "failed to remove container");
    } else {
        info!(container = %name, "container removed");
    }
}
