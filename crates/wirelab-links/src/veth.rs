//! Veth-based link variants.
//!
//! Node-to-node, node-to-host and node-to-management-bridge links all
//! materialise as a veth pair; they differ only in where the second
//! endpoint lives. The pair is created once in the host namespace under
//! random transport names, then each peer is moved into its target
//! namespace, renamed, given its MAC and MTU, optionally enslaved to a
//! bridge and brought up.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use wirelab_core::{LinkState, Result};

use crate::endpoint::Endpoint;
use crate::node::EndpointKind;
use crate::wire::Wire;
use crate::{Link, LinkKind};

/// A veth wire between two endpoints.
pub struct LinkVeth {
    kind: LinkKind,
    mtu: u32,
    endpoints: [Endpoint; 2],
    wire: Arc<dyn Wire>,
    state: Mutex<LinkState>,
}

impl LinkVeth {
    /// Creates a veth link. `kind` records which topology variant
    /// produced it (`Veth`, `MgmtNet` or `Host`).
    pub fn new(kind: LinkKind, a: Endpoint, b: Endpoint, mtu: u32, wire: Arc<dyn Wire>) -> Self {
        Self {
            kind,
            mtu,
            endpoints: [a, b],
            wire,
            state: Mutex::new(LinkState::Declared),
        }
    }
}

#[async_trait]
impl Link for LinkVeth {
    fn kind(&self) -> LinkKind {
        self.kind
    }

    fn endpoints(&self) -> Vec<&Endpoint> {
        self.endpoints.iter().collect()
    }

    async fn deploy(&self) -> Result<()> {
        // the per-link mutex plus the state field make deployment
        // at-most-once even when both endpoint workers race
        let mut state = self.state.lock().await;
        if *state == LinkState::Deployed {
            return Ok(());
        }

        for ep in &self.endpoints {
            if !ep.node().is_created() {
                debug!(link = %self, endpoint = %ep, "endpoint node not created yet");
                return Ok(());
            }
        }

        let [a, b] = &self.endpoints;
        self.wire
            .create_veth(a.transport_name(), b.transport_name(), self.mtu)
            .await?;

        for ep in &self.endpoints {
            let ns_path = ep.node().ns_path();
            if let Some(ns) = &ns_path {
                self.wire.move_to_netns(ep.transport_name(), ns).await?;
            }

            let master = (ep.node().endpoint_kind() == EndpointKind::Bridge)
                .then(|| ep.node().name());

            let reported = self
                .wire
                .finish_endpoint(
                    ns_path.as_deref(),
                    ep.transport_name(),
                    ep.iface(),
                    ep.mac_bytes()?,
                    Some(self.mtu),
                    master.as_deref(),
                )
                .await?;

            if let Some(mac) = reported {
                ep.verify_and_populate_mac(mac)?;
            }
        }

        *state = LinkState::Deployed;
        debug!(link = %self, "link deployed");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == LinkState::Removed {
            return Ok(());
        }

        // removing one side of a veth removes its peer; sweeping both
        // endpoints keeps the operation idempotent regardless of which
        // namespaces still exist. A container endpoint whose namespace
        // is gone died with it, and must not be looked up in the host
        // namespace where the same interface name may belong to the
        // host.
        for ep in &self.endpoints {
            match ep.node().endpoint_kind() {
                EndpointKind::Container => {
                    if let Some(ns) = ep.node().ns_path() {
                        self.wire.remove_if_exists(Some(&ns), ep.iface()).await?;
                    }
                }
                EndpointKind::Bridge | EndpointKind::Host => {
                    self.wire.remove_if_exists(None, ep.iface()).await?;
                }
            }
        }

        *state = LinkState::Removed;
        Ok(())
    }
}

impl std::fmt::Display for LinkVeth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.endpoints[0], self.endpoints[1])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::node::{BridgeLinkNode, HostLinkNode, LinkNode};
    use wirelab_netlink::macvlan::MacvlanMode;

    /// Wire fake that counts veth creations.
    #[derive(Default)]
    struct CountingWire {
        veth_adds: AtomicUsize,
        masters: std::sync::Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl Wire for CountingWire {
        async fn create_veth(&self, _a: &str, _b: &str, _mtu: u32) -> Result<()> {
            self.veth_adds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn move_to_netns(&self, _name: &str, _ns_path: &str) -> Result<()> {
            Ok(())
        }

        async fn finish_endpoint(
            &self,
            _ns_path: Option<&str>,
            _current: &str,
            _desired: &str,
            mac: Option<[u8; 6]>,
            _mtu: Option<u32>,
            master: Option<&str>,
        ) -> Result<Option<[u8; 6]>> {
            self.masters
                .lock()
                .unwrap()
                .push(master.map(str::to_string));
            Ok(mac)
        }

        async fn create_macvlan(
            &self,
            _name: &str,
            _parent: &str,
            _mode: MacvlanMode,
            _mtu: Option<u32>,
        ) -> Result<()> {
            Ok(())
        }

        async fn remove_if_exists(&self, _ns_path: Option<&str>, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    /// A link node whose readiness can be toggled by the test.
    struct FakeNode {
        name: String,
        created: AtomicBool,
    }

    impl FakeNode {
        fn new(name: &str, created: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                created: AtomicBool::new(created),
            })
        }
    }

    impl LinkNode for FakeNode {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn ns_path(&self) -> Option<String> {
            Some(format!("/run/netns/{}", self.name))
        }

        fn endpoint_kind(&self) -> EndpointKind {
            EndpointKind::Container
        }

        fn is_created(&self) -> bool {
            self.created.load(Ordering::SeqCst)
        }
    }

    fn veth_between(a: Arc<FakeNode>, b: Arc<FakeNode>, wire: Arc<CountingWire>) -> Arc<LinkVeth> {
        Arc::new(LinkVeth::new(
            LinkKind::Veth,
            Endpoint::new(a, "eth1", None),
            Endpoint::new(b, "eth1", None),
            9500,
            wire,
        ))
    }

    #[tokio::test]
    async fn test_deploy_waits_for_created_nodes() {
        let wire = Arc::new(CountingWire::default());
        let a = FakeNode::new("a", true);
        let b = FakeNode::new("b", false);
        let link = veth_between(a, b.clone(), wire.clone());

        link.deploy().await.unwrap();
        assert_eq!(wire.veth_adds.load(Ordering::SeqCst), 0);

        b.created.store(true, Ordering::SeqCst);
        link.deploy().await.unwrap();
        assert_eq!(wire.veth_adds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deploy_at_most_once_under_races() {
        let wire = Arc::new(CountingWire::default());
        let link = veth_between(FakeNode::new("a", true), FakeNode::new("b", true), wire.clone());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let link = link.clone();
            tasks.push(tokio::spawn(async move { link.deploy().await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(wire.veth_adds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bridge_endpoint_sets_master() {
        let wire = Arc::new(CountingWire::default());
        let link = Arc::new(LinkVeth::new(
            LinkKind::MgmtNet,
            Endpoint::new(FakeNode::new("r1", true), "eth1", None),
            Endpoint::new(Arc::new(BridgeLinkNode::new("br-mgmt")), "r1-mgmt", None),
            1500,
            wire.clone(),
        ));

        link.deploy().await.unwrap();
        let masters = wire.masters.lock().unwrap();
        assert_eq!(masters.as_slice(), &[None, Some("br-mgmt".to_string())]);
    }

    #[tokio::test]
    async fn test_host_endpoint_stays_in_host_ns() {
        let wire = Arc::new(CountingWire::default());
        let link = Arc::new(LinkVeth::new(
            LinkKind::Host,
            Endpoint::new(FakeNode::new("r1", true), "eth1", None),
            Endpoint::new(Arc::new(HostLinkNode), "r1-out", None),
            9500,
            wire.clone(),
        ));
        link.deploy().await.unwrap();
        assert_eq!(wire.veth_adds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let wire = Arc::new(CountingWire::default());
        let link = veth_between(FakeNode::new("a", true), FakeNode::new("b", true), wire.clone());
        link.deploy().await.unwrap();
        link.remove().await.unwrap();
        link.remove().await.unwrap();
    }
}
