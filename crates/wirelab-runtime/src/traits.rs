//! Runtime adapter trait and supporting types.
//!
//! The [`ContainerRuntime`] trait is the only seam through which the rest
//! of the system reaches out of the process. Everything it exposes is
//! runtime-agnostic; the Docker and podman implementations translate to
//! the Engine API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wirelab_core::{MgmtNet, NodeConfig};

use crate::error::Result;

/// Coarse container status as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerStatus {
    /// The container is running.
    Running,
    /// The container exists but is not running.
    Stopped,
    /// No container with that name exists.
    NotFound,
}

/// A uniform container record returned by `list_containers` regardless of
/// the underlying runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container names, without the leading slash.
    pub names: Vec<String>,

    /// Full container ID.
    pub id: String,

    /// First 12 characters of the ID.
    pub short_id: String,

    /// Image reference.
    pub image: String,

    /// Raw runtime state, e.g. `running`.
    pub state: String,

    /// Human-readable status line.
    pub status: String,

    /// Container labels.
    pub labels: HashMap<String, String>,

    /// Management-network addressing.
    pub network_settings: MgmtIps,
}

impl ContainerRecord {
    /// Returns the node short-name recorded in the container labels.
    pub fn node_name(&self) -> Option<&str> {
        self.labels
            .get(wirelab_core::labels::NODE_NAME_LABEL)
            .map(|s| s.as_str())
    }

    /// Returns true if the runtime reports the container running.
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Management-network addresses of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MgmtIps {
    /// IPv4 address.
    pub ipv4_addr: Option<String>,
    /// IPv4 prefix length.
    pub ipv4_prefix_len: Option<u8>,
    /// IPv6 address.
    pub ipv6_addr: Option<String>,
    /// IPv6 prefix length.
    pub ipv6_prefix_len: Option<u8>,
    /// IPv4 gateway.
    pub ipv4_gw: Option<String>,
}

/// Output of a command executed inside a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Exit code.
    pub exit_code: i64,
}

impl ExecOutput {
    /// Returns true if the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout and stderr joined.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Filter entry for `list_containers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    /// Match a label, either by presence or by `key=value`.
    Label {
        /// Label key.
        key: String,
        /// Expected value; `None` matches presence.
        value: Option<String>,
    },
    /// Match a container name exactly.
    Name(String),
    /// Match a runtime status, e.g. `running`.
    Status(String),
}

impl ListFilter {
    /// Creates a `key=value` label filter.
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Label {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates an exact-name filter.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Renders a filter list into the Engine API filter map.
    pub fn to_filter_map(filters: &[ListFilter]) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for filter in filters {
            match filter {
                ListFilter::Label { key, value } => {
                    let entry = match value {
                        Some(v) => format!("{}={}", key, v),
                        None => key.clone(),
                    };
                    map.entry("label".to_string()).or_default().push(entry);
                }
                ListFilter::Name(name) => {
                    // anchored to avoid substring matches
                    map.entry("name".to_string())
                        .or_default()
                        .push(format!("^{}$", name));
                }
                ListFilter::Status(status) => {
                    map.entry("status".to_string()).or_default().push(status.clone());
                }
            }
        }
        map
    }
}

/// Uniform contract over a local container runtime.
///
/// Implementations must be safe for concurrent use; the engine calls into
/// the adapter from many worker tasks at once.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name, e.g. `docker`.
    fn name(&self) -> &str;

    /// Returns true if this runtime's containers must be removed one at a
    /// time; the destroy path routes such nodes through a serial lane.
    fn is_serial(&self) -> bool {
        false
    }

    /// Creates the management network, or reuses an existing network of
    /// that name. Returns the descriptor enriched with the underlying
    /// bridge name, the effective MTU and the gateway addresses.
    async fn create_network(&self, mgmt: &MgmtNet) -> Result<MgmtNet>;

    /// Deletes the management network if this lab created it and no
    /// endpoints remain attached.
    async fn delete_network(&self, mgmt: &MgmtNet) -> Result<()>;

    /// Pulls an image unless it is already present.
    async fn pull_image_if_required(&self, image: &str) -> Result<()>;

    /// Creates a container from a node config without starting it.
    /// Returns the container ID.
    async fn create_container(&self, node: &NodeConfig) -> Result<String>;

    /// Starts a container, resolves its PID and exposes its network
    /// namespace under the named-namespace directory. Returns the
    /// namespace path.
    async fn start_container(&self, container_id: &str, long_name: &str) -> Result<String>;

    /// Stops a container, waiting up to `timeout` before killing it.
    async fn stop_container(&self, container_id: &str, timeout: Option<Duration>) -> Result<()>;

    /// Removes a container together with its anonymous volumes.
    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Lists containers matching all of the given filters.
    async fn list_containers(&self, filters: &[ListFilter]) -> Result<Vec<ContainerRecord>>;

    /// Returns the network namespace path of a running container.
    async fn get_ns_path(&self, container_id: &str) -> Result<String>;

    /// Executes a command and returns its output and exit code.
    async fn exec(&self, container_id: &str, cmd: &[String]) -> Result<ExecOutput>;

    /// Executes a command without waiting for it.
    async fn exec_detached(&self, container_id: &str, cmd: &[String]) -> Result<()>;

    /// Returns the coarse status of a container by name.
    async fn get_status(&self, name: &str) -> ContainerStatus;

    /// Returns the health of a container, or `Unavailable` if the
    /// container has no health probe.
    async fn get_health(&self, name: &str) -> Result<bool>;

    /// Returns the path of the container's `/etc/hosts` file on the host.
    async fn get_hosts_path(&self, container_id: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_map_rendering() {
        let filters = vec![
            ListFilter::label("containerlab", "demo"),
            ListFilter::name("clab-demo-r1"),
            ListFilter::Status("running".to_string()),
        ];
        let map = ListFilter::to_filter_map(&filters);
        assert_eq!(map["label"], vec!["containerlab=demo"]);
        assert_eq!(map["name"], vec!["^clab-demo-r1$"]);
        assert_eq!(map["status"], vec!["running"]);
    }

    #[test]
    fn test_label_presence_filter() {
        let filters = vec![ListFilter::Label {
            key: "containerlab".to_string(),
            value: None,
        }];
        let map = ListFilter::to_filter_map(&filters);
        assert_eq!(map["label"], vec!["containerlab"]);
    }

    #[test]
    fn test_exec_output() {
        let out = ExecOutput {
            stdout: "ok".to_string(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert!(out.success());
        assert_eq!(out.combined_output(), "ok");

        let out = ExecOutput {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            exit_code: 1,
        };
        assert!(!out.success());
        assert_eq!(out.combined_output(), "out\nerr");
    }

    #[test]
    fn test_record_node_name() {
        let mut record = ContainerRecord::default();
        assert_eq!(record.node_name(), None);
        record
            .labels
            .insert("clab-node-name".to_string(), "r1".to_string());
        assert_eq!(record.node_name(), Some("r1"));
    }
}
