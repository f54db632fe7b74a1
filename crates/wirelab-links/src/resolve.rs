//! Link resolution: binding topology descriptors to concrete links.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use wirelab_core::error::{LabError, Result};
use wirelab_core::topology::{
    LinkDescriptor, ParsedEndpoint, HOST_PSEUDO_NODE, MACVLAN_PSEUDO_NODE, MGMT_NET_PSEUDO_NODE,
};
use wirelab_netlink::macvlan::MacvlanMode;

use crate::endpoint::Endpoint;
use crate::macvlan::LinkMacVlan;
use crate::node::{BridgeLinkNode, HostLinkNode, LinkNodeRef};
use crate::veth::LinkVeth;
use crate::wire::Wire;
use crate::{Link, LinkKind};

/// Inputs needed to resolve link descriptors.
pub struct ResolveParams<'a> {
    /// Managed nodes by short name.
    pub nodes: &'a HashMap<String, LinkNodeRef>,
    /// Name of the management bridge, looked up from the runtime adapter.
    pub mgmt_bridge: &'a str,
    /// Wire implementation handed to every link.
    pub wire: Arc<dyn Wire>,
}

impl ResolveParams<'_> {
    fn node(&self, ep: &ParsedEndpoint) -> Result<LinkNodeRef> {
        self.nodes.get(&ep.node).cloned().ok_or_else(|| {
            LabError::config(format!("endpoint {} references unknown node {:?}", ep, ep.node))
        })
    }
}

/// Resolves a single descriptor into a link. A descriptor with two
/// regular node references is a veth; one pseudo-node reference selects
/// the mgmt-net, host or macvlan variant.
pub fn resolve_link(desc: &LinkDescriptor, params: &ResolveParams<'_>) -> Result<Arc<dyn Link>> {
    let (first, second) = desc.parsed_endpoints()?;
    let mtu = desc.effective_mtu();

    // at most one pseudo endpoint passes descriptor validation
    let (pseudo, regular) = if first.is_pseudo() {
        (Some(&first), &second)
    } else if second.is_pseudo() {
        (Some(&second), &first)
    } else {
        (None, &first)
    };

    let link: Arc<dyn Link> = match pseudo.map(|p| p.node.as_str()) {
        None => Arc::new(LinkVeth::new(
            LinkKind::Veth,
            Endpoint::new(params.node(&first)?, &first.iface, None),
            Endpoint::new(params.node(&second)?, &second.iface, None),
            mtu,
            params.wire.clone(),
        )),
        Some(MGMT_NET_PSEUDO_NODE) => {
            let bridge: LinkNodeRef = Arc::new(BridgeLinkNode::new(params.mgmt_bridge));
            let pseudo = pseudo.expect("pseudo endpoint present");
            Arc::new(LinkVeth::new(
                LinkKind::MgmtNet,
                Endpoint::new(params.node(regular)?, &regular.iface, None),
                Endpoint::new(bridge, &pseudo.iface, None),
                mtu,
                params.wire.clone(),
            ))
        }
        Some(HOST_PSEUDO_NODE) => {
            let pseudo = pseudo.expect("pseudo endpoint present");
            Arc::new(LinkVeth::new(
                LinkKind::Host,
                Endpoint::new(params.node(regular)?, &regular.iface, None),
                Endpoint::new(Arc::new(HostLinkNode), &pseudo.iface, None),
                mtu,
                params.wire.clone(),
            ))
        }
        Some(MACVLAN_PSEUDO_NODE) => {
            let pseudo = pseudo.expect("pseudo endpoint present");
            let mode: MacvlanMode = desc
                .mode
                .as_deref()
                .unwrap_or("")
                .parse()
                .map_err(|e| LabError::config(format!("link {}: {}", desc, e)))?;
            Arc::new(LinkMacVlan::new(
                Endpoint::new(Arc::new(HostLinkNode), &pseudo.iface, None),
                Endpoint::new(params.node(regular)?, &regular.iface, None),
                mode,
                desc.mtu,
                params.wire.clone(),
            ))
        }
        Some(other) => {
            return Err(LabError::config(format!(
                "unknown pseudo-node {:?} in link {}",
                other, desc
            )))
        }
    };

    Ok(link)
}

/// Resolves the full link list and validates endpoint uniqueness.
pub fn resolve_links(
    descriptors: &[LinkDescriptor],
    params: &ResolveParams<'_>,
) -> Result<Vec<Arc<dyn Link>>> {
    let links = descriptors
        .iter()
        .map(|desc| resolve_link(desc, params))
        .collect::<Result<Vec<_>>>()?;
    check_endpoint_uniqueness(&links)?;
    Ok(links)
}

/// Rejects topologies where two endpoints share `(node, interface)`.
/// Macvlan parent interfaces are exempt: several macvlans may share one
/// parent.
pub fn check_endpoint_uniqueness(links: &[Arc<dyn Link>]) -> Result<()> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for link in links {
        for ep in link.endpoints() {
            if link.kind() == LinkKind::Macvlan
                && ep.node().endpoint_kind() == crate::node::EndpointKind::Host
            {
                continue;
            }
            if !seen.insert((ep.node().name(), ep.iface().to_string())) {
                return Err(LabError::config(format!("duplicate endpoint {}", ep)));
            }
        }
    }
    Ok(())
}
