//! Typed link variants for wirelab.
//!
//! A link is a virtual wire between two endpoints. Four variants exist:
//! veth between two managed nodes, veth from a node to the lab management
//! bridge, veth from a node into the host namespace, and macvlan from a
//! host parent interface into a node. Deployment is idempotent: each link
//! guards its materialisation with a mutex and a state field, and returns
//! early while either endpoint node has not reached `created`.

pub mod endpoint;
pub mod macvlan;
pub mod node;
pub mod resolve;
pub mod veth;
pub mod wire;

pub use endpoint::Endpoint;
pub use macvlan::LinkMacVlan;
pub use node::{BridgeLinkNode, EndpointKind, HostLinkNode, LinkNode, LinkNodeRef};
pub use resolve::{check_endpoint_uniqueness, resolve_link, resolve_links, ResolveParams};
pub use veth::LinkVeth;
pub use wire::{KernelWire, Wire};

use async_trait::async_trait;
use wirelab_core::Result;

/// Which topology variant a link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Veth between two managed nodes.
    Veth,
    /// Veth from a node to the lab management bridge.
    MgmtNet,
    /// Veth from a node into the host namespace.
    Host,
    /// Macvlan from a host parent interface into a node.
    Macvlan,
}

impl std::fmt::Debug for dyn Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// A virtual wire between two endpoints.
#[async_trait]
pub trait Link: Send + Sync + std::fmt::Display {
    /// The link variant.
    fn kind(&self) -> LinkKind;

    /// Both endpoints of the wire.
    fn endpoints(&self) -> Vec<&Endpoint>;

    /// Returns true once every endpoint node is in state `created` or
    /// later, i.e. the link may be dispatched.
    fn ready(&self) -> bool {
        self.endpoints().iter().all(|ep| ep.node().is_created())
    }

    /// Returns true if an endpoint node failed terminally; the link can
    /// never become ready and is reported as orphaned.
    fn orphaned(&self) -> bool {
        self.endpoints().iter().any(|ep| ep.node().is_failed())
    }

    /// Materialises the wire. Idempotent; a no-op while not `ready`.
    async fn deploy(&self) -> Result<()>;

    /// Removes the wire. Idempotent; missing interfaces are success.
    async fn remove(&self) -> Result<()>;
}
