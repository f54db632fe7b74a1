//! Podman implementation of the runtime adapter.
//!
//! Podman exposes a Docker-compatible API socket, so this adapter drives
//! podman through the same Engine API client as the Docker adapter. The
//! one behavioural difference the engine cares about is removal: podman
//! containers are removed through the serial destroy lane.

use std::path::PathBuf;
use std::time::Duration;

use bollard::{Docker, API_DEFAULT_VERSION};
use tracing::info;
use wirelab_core::{MgmtNet, NodeConfig};

use crate::docker::{DockerRuntime, RuntimeConfig};
use crate::error::{Result, RuntimeError};
use crate::traits::{
    ContainerRecord, ContainerRuntime, ContainerStatus, ExecOutput, ListFilter,
};

/// Podman runtime adapter.
pub struct PodmanRuntime {
    inner: DockerRuntime,
}

impl PodmanRuntime {
    /// Connects to the local podman API socket and verifies the
    /// connection.
    pub async fn new(config: RuntimeConfig) -> Result<Self> {
        let socket = Self::socket_path().ok_or_else(|| {
            RuntimeError::unavailable("no podman API socket found; is the podman socket enabled?")
        })?;
        let client = Docker::connect_with_socket(
            &socket.to_string_lossy(),
            config.timeout.as_secs(),
            API_DEFAULT_VERSION,
        )?;
        client.ping().await?;
        info!(socket = %socket.display(), "connected to podman");
        Ok(Self {
            inner: DockerRuntime::with_client(client, config),
        })
    }

    /// Locates the podman compatibility socket: the rootless per-user
    /// socket first, the system socket second.
    fn socket_path() -> Option<PathBuf> {
        if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
            let candidate = PathBuf::from(runtime_dir).join("podman/podman.sock");
            if candidate.exists() {
                return Some(candidate);
            }
        }
        let system = PathBuf::from("/run/podman/podman.sock");
        system.exists().then_some(system)
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for PodmanRuntime {
    fn name(&self) -> &str {
        "podman"
    }

    fn is_serial(&self) -> bool {
        true
    }

    async fn create_network(&self, mgmt: &MgmtNet) -> Result<MgmtNet> {
        self.inner.create_network(mgmt).await
    }

    async fn delete_network(&self, mgmt: &MgmtNet) -> Result<()> {
        self.inner.delete_network(mgmt).await
    }

    async fn pull_image_if_required(&self, image: &str) -> Result<()> {
        self.inner.pull_image_if_required(image).await
    }

    async fn create_container(&self, node: &NodeConfig) -> Result<String> {
        self.inner.create_container(node).await
    }

    async fn start_container(&self, container_id: &str, long_name: &str) -> Result<String> {
        self.inner.start_container(container_id, long_name).await
    }

    async fn stop_container(&self, container_id: &str, timeout: Option<Duration>) -> Result<()> {
        self.inner.stop_container(container_id, timeout).await
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.inner.remove_container(container_id).await
    }

    async fn list_containers(&self, filters: &[ListFilter]) -> Result<Vec<ContainerRecord>> {
        self.inner.list_containers(filters).await
    }

    async fn get_ns_path(&self, container_id: &str) -> Result<String> {
        self.inner.get_ns_path(container_id).await
    }

    async fn exec(&self, container_id: &str, cmd: &[String]) -> Result<ExecOutput> {
        self.inner.exec(container_id, cmd).await
    }

    async fn exec_detached(&self, container_id: &str, cmd: &[String]) -> Result<()> {
        self.inner.exec_detached(container_id, cmd).await
    }

    async fn get_status(&self, name: &str) -> ContainerStatus {
        self.inner.get_status(name).await
    }

    async fn get_health(&self, name: &str) -> Result<bool> {
        self.inner.get_health(name).await
    }

    async fn get_hosts_path(&self, container_id: &str) -> Result<String> {
        self.inner.get_hosts_path(container_id).await
    }
}
