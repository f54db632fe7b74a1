//! Management network descriptor.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};

/// Default management network name.
pub const DEFAULT_MGMT_NETWORK: &str = "clab";

/// Default management IPv4 subnet.
pub const DEFAULT_IPV4_SUBNET: &str = "172.20.20.0/24";

/// Default management IPv6 subnet.
pub const DEFAULT_IPV6_SUBNET: &str = "2001:172:20:20::/64";

/// Descriptor of the shared management network every node's first
/// interface attaches to.
///
/// The `bridge`, `ipv4_gw` and `ipv6_gw` fields are populated by the
/// runtime adapter when the network is created or reused, so that
/// configuration templates can reference them before nodes come up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MgmtNet {
    /// Runtime network name.
    #[serde(default = "default_network")]
    pub network: String,

    /// IPv4 subnet in CIDR form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_subnet: Option<String>,

    /// IPv6 subnet in CIDR form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_subnet: Option<String>,

    /// Name of the underlying Linux bridge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,

    /// MTU; discovered from the runtime's default network when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// IPv4 gateway, populated at network-create time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_gw: Option<String>,

    /// IPv6 gateway, populated at network-create time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_gw: Option<String>,
}

fn default_network() -> String {
    DEFAULT_MGMT_NETWORK.to_string()
}

impl Default for MgmtNet {
    fn default() -> Self {
        Self {
            network: default_network(),
            ipv4_subnet: Some(DEFAULT_IPV4_SUBNET.to_string()),
            ipv6_subnet: Some(DEFAULT_IPV6_SUBNET.to_string()),
            bridge: None,
            mtu: None,
            ipv4_gw: None,
            ipv6_gw: None,
        }
    }
}

impl MgmtNet {
    /// Fills in the default subnets when both address families are unset,
    /// matching the behaviour of an omitted `mgmt` block.
    pub fn apply_subnet_defaults(&mut self) {
        if self.ipv4_subnet.is_none() && self.ipv6_subnet.is_none() {
            self.ipv4_subnet = Some(DEFAULT_IPV4_SUBNET.to_string());
            self.ipv6_subnet = Some(DEFAULT_IPV6_SUBNET.to_string());
        }
    }

    /// Validates the configured subnets.
    pub fn validate(&self) -> Result<()> {
        for subnet in [&self.ipv4_subnet, &self.ipv6_subnet].into_iter().flatten() {
            subnet
                .parse::<IpNetwork>()
                .map_err(|_| LabError::config(format!("invalid mgmt subnet {:?}", subnet)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let mgmt = MgmtNet::default();
        assert_eq!(mgmt.network, "clab");
        assert_eq!(mgmt.ipv4_subnet.as_deref(), Some(DEFAULT_IPV4_SUBNET));
        assert!(mgmt.validate().is_ok());
    }

    #[test]
    fn test_subnet_defaults_only_when_both_unset() {
        let mut mgmt = MgmtNet {
            ipv4_subnet: None,
            ipv6_subnet: Some("2001:db8::/64".to_string()),
            ..Default::default()
        };
        mgmt.apply_subnet_defaults();
        assert!(mgmt.ipv4_subnet.is_none());

        let mut mgmt = MgmtNet {
            ipv4_subnet: None,
            ipv6_subnet: None,
            ..Default::default()
        };
        mgmt.apply_subnet_defaults();
        assert_eq!(mgmt.ipv4_subnet.as_deref(), Some(DEFAULT_IPV4_SUBNET));
    }

    #[test]
    fn test_invalid_subnet() {
        let mgmt = MgmtNet {
            ipv4_subnet: Some("300.0.0.0/8".to_string()),
            ..Default::default()
        };
        assert!(mgmt.validate().is_err());
    }
}
