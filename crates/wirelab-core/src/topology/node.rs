//! Node configuration and lifecycle state.

use std::collections::HashMap;
use std::fmt;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};

/// Configuration of a single lab node.
///
/// The fields up to `exec` come from the topology file (with kind and
/// global defaults merged in); the remaining fields are populated by the
/// engine during resolution and deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NodeConfig {
    /// Node kind, selects the node plug-in. Defaults to `linux`.
    #[serde(default)]
    pub kind: String,

    /// Container image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    /// Command override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    /// Environment variables.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Bind mounts in `src:dst[:mode]` form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,

    /// Port bindings in `[host_ip:]host_port:container_port[/proto]` form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,

    /// Sysctls applied inside the container.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sysctls: HashMap<String, String>,

    /// Static management IPv4 address with prefix, e.g. `172.20.20.2/24`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_ipv4: Option<String>,

    /// Static management IPv6 address with prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_ipv6: Option<String>,

    /// Management interface MAC; generated under the lab OUI if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    /// Container network mode.
    #[serde(default)]
    pub network_mode: NetworkMode,

    /// Names of nodes this node waits for before deploying.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for: Vec<String>,

    /// Seconds to sleep before the deploy phase starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_delay: Option<u64>,

    /// Container labels.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Commands executed in the container once the deploy finishes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<String>,

    /// Memory limit, e.g. `512m` or `2g`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// CPU limit in cores, e.g. `1.5`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,

    /// Cpuset specification, e.g. `0-3`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_set: Option<String>,

    /// User to run the container as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    // Fields below are populated during resolution and deployment.
    /// `name:ip` entries injected into the container's `/etc/hosts`,
    /// collected from nodes with static management IPs. Set during
    /// resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,

    /// Short name, unique within the lab. Set during resolution.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_name: String,

    /// Lab-prefixed long name, unique on the host. Set during resolution.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub long_name: String,

    /// Lab-wide node index. Set during resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// Container ID, set after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    /// Resolved management IPv4 address (without prefix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_ipv4_address: Option<String>,

    /// Resolved management IPv6 address (without prefix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_ipv6_address: Option<String>,

    /// Network namespace path, set after the container starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns_path: Option<String>,
}

impl NodeConfig {
    /// Fills unset fields from a defaults block. Maps are merged with the
    /// node's own entries winning.
    pub fn apply_defaults(&mut self, defaults: &NodeDefaults) {
        if self.image.is_none() {
            self.image = defaults.image.clone();
        }
        if self.entrypoint.is_none() {
            self.entrypoint = defaults.entrypoint.clone();
        }
        if self.cmd.is_none() {
            self.cmd = defaults.cmd.clone();
        }
        for (k, v) in &defaults.env {
            self.env.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for bind in &defaults.binds {
            if !self.binds.contains(bind) {
                self.binds.push(bind.clone());
            }
        }
        for (k, v) in &defaults.sysctls {
            self.sysctls.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &defaults.labels {
            self.labels.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// Returns true if the node has a static management IPv4 or IPv6.
    pub fn has_static_mgmt_ip(&self) -> bool {
        self.mgmt_ipv4.is_some() || self.mgmt_ipv6.is_some()
    }

    /// Returns the static IPv4 address without its prefix, if configured.
    pub fn static_ipv4(&self) -> Result<Option<String>> {
        match &self.mgmt_ipv4 {
            None => Ok(None),
            Some(s) => {
                let net: IpNetwork = s
                    .parse()
                    .map_err(|_| LabError::config(format!("invalid mgmt-ipv4 {:?}", s)))?;
                Ok(Some(net.ip().to_string()))
            }
        }
    }

    /// Returns the static IPv6 address without its prefix, if configured.
    pub fn static_ipv6(&self) -> Result<Option<String>> {
        match &self.mgmt_ipv6 {
            None => Ok(None),
            Some(s) => {
                let net: IpNetwork = s
                    .parse()
                    .map_err(|_| LabError::config(format!("invalid mgmt-ipv6 {:?}", s)))?;
                Ok(Some(net.ip().to_string()))
            }
        }
    }

    /// Validates the resolved config.
    pub fn validate(&self) -> Result<()> {
        if let Some(mac) = &self.mac_address {
            crate::mac::parse(mac)?;
        }
        self.static_ipv4()?;
        self.static_ipv6()?;
        if let NetworkMode::Container(name) = &self.network_mode {
            if name.is_empty() {
                return Err(LabError::config(format!(
                    "node {:?} has an empty container network-mode reference",
                    self.short_name
                )));
            }
        }
        Ok(())
    }
}

/// Defaults block used by `topology.kinds.<kind>` and `topology.defaults`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NodeDefaults {
    /// Default kind (only meaningful in the global defaults block).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Default image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Default entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    /// Default command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    /// Default environment, merged under node-level entries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Default bind mounts, appended if absent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,

    /// Default sysctls, merged under node-level entries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sysctls: HashMap<String, String>,

    /// Default labels, merged under node-level entries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// Container network mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkMode {
    /// Attached to the lab management network.
    #[default]
    Bridge,
    /// Shares the host network stack.
    Host,
    /// Shares another container's network namespace.
    Container(String),
}

impl NetworkMode {
    /// Parses the topology-file string form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "" | "bridge" => Ok(Self::Bridge),
            "host" => Ok(Self::Host),
            other => match other.split_once(':') {
                Some(("container", name)) if !name.is_empty() => {
                    Ok(Self::Container(name.to_string()))
                }
                _ => Err(LabError::config(format!("unknown network-mode {:?}", s))),
            },
        }
    }

    /// Returns the referenced container name for `container:<name>` mode.
    pub fn container_ref(&self) -> Option<&str> {
        match self {
            Self::Container(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge => write!(f, "bridge"),
            Self::Host => write!(f, "host"),
            Self::Container(name) => write!(f, "container:{}", name),
        }
    }
}

impl Serialize for NetworkMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetworkMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle state of a node.
///
/// Transitions are driven exclusively by the deployment engine; observers
/// read the state under the engine's reader/writer lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeState {
    /// Declared in the topology, nothing materialised yet.
    #[default]
    Defined,
    /// Per-node artefacts rendered, container not yet created.
    PreDeployed,
    /// Container created and started.
    Created,
    /// Post-deploy hooks completed.
    Configured,
    /// Runtime reports the container healthy.
    Healthy,
    /// Container stopped and removed.
    Removed,
    /// Deployment failed terminally.
    Failed,
}

impl NodeState {
    /// Returns true once the node has reached `created` or a later state.
    pub fn is_created(self) -> bool {
        matches!(self, Self::Created | Self::Configured | Self::Healthy)
    }

    /// Returns true if the node can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Removed | Self::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Defined => "defined",
            Self::PreDeployed => "pre-deployed",
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Healthy => "healthy",
            Self::Removed => "removed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A labelled checkpoint in a node's lifecycle used for dependency waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Container created and started.
    Created,
    /// Post-deploy hooks completed.
    Configured,
    /// Runtime reports the container healthy.
    Healthy,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Phase; 3] = [Phase::Created, Phase::Configured, Phase::Healthy];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Healthy => "healthy",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_mode_parse() {
        assert_eq!(NetworkMode::parse("bridge").unwrap(), NetworkMode::Bridge);
        assert_eq!(NetworkMode::parse("").unwrap(), NetworkMode::Bridge);
        assert_eq!(NetworkMode::parse("host").unwrap(), NetworkMode::Host);
        assert_eq!(
            NetworkMode::parse("container:ext1").unwrap(),
            NetworkMode::Container("ext1".to_string())
        );
        assert!(NetworkMode::parse("container:").is_err());
        assert!(NetworkMode::parse("macvtap").is_err());
    }

    #[test]
    fn test_network_mode_display() {
        assert_eq!(NetworkMode::Container("x".into()).to_string(), "container:x");
        assert_eq!(NetworkMode::Host.to_string(), "host");
    }

    #[test]
    fn test_node_state_progression() {
        assert!(!NodeState::Defined.is_created());
        assert!(NodeState::Created.is_created());
        assert!(NodeState::Healthy.is_created());
        assert!(NodeState::Failed.is_terminal());
        assert!(!NodeState::Created.is_terminal());
    }

    #[test]
    fn test_static_ip_parsing() {
        let node = NodeConfig {
            mgmt_ipv4: Some("172.20.20.2/24".to_string()),
            ..Default::default()
        };
        assert_eq!(node.static_ipv4().unwrap().unwrap(), "172.20.20.2");
        assert!(node.has_static_mgmt_ip());

        let bad = NodeConfig {
            mgmt_ipv4: Some("not-an-ip".to_string()),
            ..Default::default()
        };
        assert!(bad.static_ipv4().is_err());
    }

    #[test]
    fn test_apply_defaults_does_not_override() {
        let mut node = NodeConfig {
            image: Some("alpine:3".to_string()),
            ..Default::default()
        };
        node.env.insert("A".to_string(), "node".to_string());

        let mut defaults = NodeDefaults {
            image: Some("busybox:1".to_string()),
            ..Default::default()
        };
        defaults.env.insert("A".to_string(), "default".to_string());
        defaults.env.insert("B".to_string(), "default".to_string());

        node.apply_defaults(&defaults);
        assert_eq!(node.image.as_deref(), Some("alpine:3"));
        assert_eq!(node.env["A"], "node");
        assert_eq!(node.env["B"], "default");
    }
}
