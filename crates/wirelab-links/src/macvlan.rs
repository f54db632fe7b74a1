//! Macvlan link variant.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use wirelab_core::error::LabError;
use wirelab_core::{LinkState, Result};
use wirelab_netlink::macvlan::MacvlanMode;

use crate::endpoint::Endpoint;
use crate::wire::Wire;
use crate::{Link, LinkKind};

/// A macvlan from a host parent interface into a node namespace.
pub struct LinkMacVlan {
    mtu: Option<u32>,
    mode: MacvlanMode,
    /// The host-side parent interface, represented as a host endpoint.
    host_ep: Endpoint,
    /// The container-side endpoint the macvlan lands on.
    node_ep: Endpoint,
    wire: Arc<dyn Wire>,
    state: Mutex<LinkState>,
}

impl LinkMacVlan {
    /// Creates a macvlan link.
    pub fn new(
        host_ep: Endpoint,
        node_ep: Endpoint,
        mode: MacvlanMode,
        mtu: Option<u32>,
        wire: Arc<dyn Wire>,
    ) -> Self {
        Self {
            mtu,
            mode,
            host_ep,
            node_ep,
            wire,
            state: Mutex::new(LinkState::Declared),
        }
    }

    /// The host parent interface name.
    pub fn parent(&self) -> &str {
        self.host_ep.iface()
    }

    /// The macvlan mode.
    pub fn mode(&self) -> MacvlanMode {
        self.mode
    }
}

#[async_trait]
impl Link for LinkMacVlan {
    fn kind(&self) -> LinkKind {
        LinkKind::Macvlan
    }

    fn endpoints(&self) -> Vec<&Endpoint> {
        vec![&self.node_ep, &self.host_ep]
    }

    async fn deploy(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == LinkState::Deployed {
            return Ok(());
        }
        if !self.node_ep.node().is_created() {
            debug!(link = %self, "endpoint node not created yet");
            return Ok(());
        }

        let ns_path = self.node_ep.node().ns_path().ok_or_else(|| {
            LabError::netlink(format!(
                "macvlan endpoint {} has no network namespace",
                self.node_ep
            ))
        })?;

        self.wire
            .create_macvlan(
                self.node_ep.transport_name(),
                self.host_ep.iface(),
                self.mode,
                self.mtu,
            )
            .await?;

        self.wire
            .move_to_netns(self.node_ep.transport_name(), &ns_path)
            .await?;

        let reported = self
            .wire
            .finish_endpoint(
                Some(&ns_path),
                self.node_ep.transport_name(),
                self.node_ep.iface(),
                self.node_ep.mac_bytes()?,
                self.mtu,
                None,
            )
            .await?;
        if let Some(mac) = reported {
            self.node_ep.verify_and_populate_mac(mac)?;
        }

        *state = LinkState::Deployed;
        debug!(link = %self, "macvlan deployed");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == LinkState::Removed {
            return Ok(());
        }
        // symmetric to deploy: delete the device from the node
        // namespace. With the namespace already gone the macvlan died
        // with it.
        if let Some(ns) = self.node_ep.node().ns_path() {
            self.wire
                .remove_if_exists(Some(&ns), self.node_ep.iface())
                .await?;
        }
        *state = LinkState::Removed;
        Ok(())
    }
}

impl std::fmt::Display for LinkMacVlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} <-> macvlan:{} ({})",
            self.node_ep,
            self.host_ep.iface(),
            self.mode
        )
    }
}
