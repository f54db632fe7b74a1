//! Link descriptors and link lifecycle state.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};

/// Default MTU applied to lab wires when the descriptor leaves it unset.
pub const DEFAULT_LINK_MTU: u32 = 9500;

/// Reserved endpoint name selecting the host-namespace link variant.
pub const HOST_PSEUDO_NODE: &str = "host";

/// Reserved endpoint name selecting the management-bridge link variant.
pub const MGMT_NET_PSEUDO_NODE: &str = "mgmt-net";

/// Reserved endpoint name selecting the macvlan link variant.
pub const MACVLAN_PSEUDO_NODE: &str = "macvlan";

/// A link descriptor as written in the topology file.
///
/// Two regular node references make a veth; one pseudo-node reference
/// (`host`, `mgmt-net`, `macvlan`) selects the corresponding variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDescriptor {
    /// Exactly two `node:interface` endpoint strings.
    pub endpoints: Vec<String>,

    /// Wire MTU; defaults to [`DEFAULT_LINK_MTU`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// Macvlan mode for macvlan links; defaults to `bridge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Free-form labels attached to the wire.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Free-form variables available to config templates.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vars: HashMap<String, String>,
}

impl LinkDescriptor {
    /// Creates a descriptor from two endpoint strings.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            endpoints: vec![a.into(), b.into()],
            ..Default::default()
        }
    }

    /// Validates the descriptor shape.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.len() != 2 {
            return Err(LabError::config(format!(
                "link must have exactly 2 endpoints, got {}",
                self.endpoints.len()
            )));
        }
        for ep in &self.endpoints {
            ParsedEndpoint::parse(ep)?;
        }
        let pseudo = self
            .endpoints
            .iter()
            .filter(|e| ParsedEndpoint::parse(e).map(|p| p.is_pseudo()).unwrap_or(false))
            .count();
        if pseudo > 1 {
            return Err(LabError::config(format!(
                "link {} may reference at most one pseudo-node",
                self
            )));
        }
        Ok(())
    }

    /// Returns the effective MTU for this wire.
    pub fn effective_mtu(&self) -> u32 {
        self.mtu.unwrap_or(DEFAULT_LINK_MTU)
    }

    /// Parses both endpoint strings.
    pub fn parsed_endpoints(&self) -> Result<(ParsedEndpoint, ParsedEndpoint)> {
        self.validate()?;
        Ok((
            ParsedEndpoint::parse(&self.endpoints[0])?,
            ParsedEndpoint::parse(&self.endpoints[1])?,
        ))
    }
}

impl fmt::Display for LinkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoints.join(" <-> "))
    }
}

/// A `node:interface` endpoint string split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    /// Node short-name or pseudo-node name.
    pub node: String,
    /// Interface name inside the node (or the host interface for
    /// `host`/`mgmt-net`/`macvlan` endpoints).
    pub iface: String,
}

impl ParsedEndpoint {
    /// Splits a `node:interface` string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((node, iface)) if !node.is_empty() && !iface.is_empty() => Ok(Self {
                node: node.to_string(),
                iface: iface.to_string(),
            }),
            _ => Err(LabError::config(format!(
                "malformed endpoint {:?}, expected \"node:interface\"",
                s
            ))),
        }
    }

    /// Returns true if the endpoint references a reserved pseudo-node.
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self.node.as_str(),
            HOST_PSEUDO_NODE | MGMT_NET_PSEUDO_NODE | MACVLAN_PSEUDO_NODE
        )
    }
}

impl fmt::Display for ParsedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.iface)
    }
}

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    /// Declared in the topology, not yet materialised.
    #[default]
    Declared,
    /// The wire exists in the kernel.
    Deployed,
    /// The wire was removed.
    Removed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let ep = ParsedEndpoint::parse("r1:eth1").unwrap();
        assert_eq!(ep.node, "r1");
        assert_eq!(ep.iface, "eth1");
        assert!(!ep.is_pseudo());

        assert!(ParsedEndpoint::parse("r1").is_err());
        assert!(ParsedEndpoint::parse(":eth1").is_err());
        assert!(ParsedEndpoint::parse("r1:").is_err());
    }

    #[test]
    fn test_pseudo_detection() {
        assert!(ParsedEndpoint::parse("host:veth1").unwrap().is_pseudo());
        assert!(ParsedEndpoint::parse("mgmt-net:br-ep").unwrap().is_pseudo());
        assert!(ParsedEndpoint::parse("macvlan:eth0").unwrap().is_pseudo());
    }

    #[test]
    fn test_descriptor_validation() {
        let ok = LinkDescriptor::new("r1:eth1", "r2:eth1");
        assert!(ok.validate().is_ok());
        assert_eq!(ok.effective_mtu(), DEFAULT_LINK_MTU);

        let one_sided = LinkDescriptor {
            endpoints: vec!["r1:eth1".to_string()],
            ..Default::default()
        };
        assert!(one_sided.validate().is_err());

        let two_pseudo = LinkDescriptor::new("host:a", "mgmt-net:b");
        assert!(two_pseudo.validate().is_err());
    }

    #[test]
    fn test_descriptor_display() {
        let link = LinkDescriptor::new("r1:eth1", "r2:eth1");
        assert_eq!(link.to_string(), "r1:eth1 <-> r2:eth1");
    }
}
