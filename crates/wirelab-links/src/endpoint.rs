//! Link endpoints.

use std::fmt;
use std::sync::{Mutex, OnceLock};

use wirelab_core::error::{LabError, Result};

use crate::node::LinkNodeRef;

/// One side of a wire: a node reference, the interface name inside that
/// node, and the interface MAC.
///
/// The transport name is the random interface name the wire is created
/// under in the host namespace before it is moved and renamed; it is
/// generated lazily and kept stable for the endpoint's lifetime.
pub struct Endpoint {
    node: LinkNodeRef,
    iface: String,
    mac: Mutex<Option<String>>,
    transport: OnceLock<String>,
}

impl Endpoint {
    /// Creates an endpoint. When `mac` is `None` a MAC under the lab OUI
    /// is assigned.
    pub fn new(node: LinkNodeRef, iface: impl Into<String>, mac: Option<String>) -> Self {
        Self {
            node,
            iface: iface.into(),
            mac: Mutex::new(Some(mac.unwrap_or_else(wirelab_core::mac::generate))),
            transport: OnceLock::new(),
        }
    }

    /// The node this endpoint lives on.
    pub fn node(&self) -> &LinkNodeRef {
        &self.node
    }

    /// The interface name inside the node.
    pub fn iface(&self) -> &str {
        &self.iface
    }

    /// The endpoint's MAC address.
    pub fn mac(&self) -> Option<String> {
        self.mac.lock().expect("mac lock poisoned").clone()
    }

    /// The endpoint's MAC as raw bytes.
    pub fn mac_bytes(&self) -> Result<Option<[u8; 6]>> {
        match self.mac() {
            None => Ok(None),
            Some(mac) => wirelab_core::mac::parse(&mac).map(Some),
        }
    }

    /// Records the kernel-reported MAC. Fails if a different MAC was
    /// already pinned for this endpoint.
    pub fn verify_and_populate_mac(&self, actual: [u8; 6]) -> Result<()> {
        let mut mac = self.mac.lock().expect("mac lock poisoned");
        let actual_str = wirelab_core::mac::format(&actual);
        match mac.as_ref() {
            None => {
                *mac = Some(actual_str);
                Ok(())
            }
            Some(expected) if expected.eq_ignore_ascii_case(&actual_str) => Ok(()),
            Some(expected) => Err(LabError::netlink(format!(
                "endpoint {} expected mac {:?}, got {:?}",
                self, expected, actual_str
            ))),
        }
    }

    /// Random transport interface name, generated on first use.
    pub fn transport_name(&self) -> &str {
        self.transport
            .get_or_init(wirelab_netlink::veth::random_ifname)
    }

    /// Returns true if the other endpoint names the same `(node, iface)`.
    pub fn same_node_and_iface(&self, other: &Endpoint) -> bool {
        self.node.name() == other.node.name() && self.iface == other.iface
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node.name(), self.iface)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("node", &self.node.name())
            .field("iface", &self.iface)
            .field("mac", &self.mac())
            .finish()
    }
}
