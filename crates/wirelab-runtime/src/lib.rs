//! Container runtime adapter for wirelab.
//!
//! The [`ContainerRuntime`] trait gives the engine a uniform contract
//! over a local container runtime: network create, image pull, container
//! lifecycle, inspect, exec and health. Two implementations ship here,
//! both speaking the Docker Engine API over a local unix socket:
//!
//! - [`DockerRuntime`] against the Docker daemon
//! - [`PodmanRuntime`] against podman's compatibility socket
//!
//! The adapter is the only component that reaches out of the process.

pub mod docker;
pub mod error;
pub mod hostcfg;
pub mod podman;
pub mod traits;

pub use docker::{DockerRuntime, RuntimeConfig};
pub use error::{Result, RuntimeError};
pub use podman::PodmanRuntime;
pub use traits::{
    ContainerRecord, ContainerRuntime, ContainerStatus, ExecOutput, ListFilter, MgmtIps,
};

use std::sync::Arc;

/// Environment variable selecting the default runtime.
pub const RUNTIME_ENV: &str = "CLAB_RUNTIME";

/// Instantiates a runtime by name, consulting `CLAB_RUNTIME` and then
/// defaulting to Docker when `name` is empty.
pub async fn connect(name: &str, config: RuntimeConfig) -> Result<Arc<dyn ContainerRuntime>> {
    let name = if !name.is_empty() {
        name.to_string()
    } else {
        std::env::var(RUNTIME_ENV).unwrap_or_else(|_| "docker".to_string())
    };

    match name.as_str() {
        "docker" => Ok(Arc::new(DockerRuntime::new(config).await?)),
        "podman" => Ok(Arc::new(PodmanRuntime::new(config).await?)),
        other => Err(RuntimeError::unavailable(format!(
            "unknown container runtime {:?}",
            other
        ))),
    }
}
