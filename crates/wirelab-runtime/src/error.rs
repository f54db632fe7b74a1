//! Error types for the runtime adapter.

use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised by a container runtime adapter.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Failed to pull an image.
    #[error("failed to pull image {image}: {reason}")]
    ImagePullFailed {
        /// The image reference.
        image: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Failed to create the management network.
    #[error("failed to create network {name}: {reason}")]
    NetworkCreateFailed {
        /// The network name.
        name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Failed to create a container.
    #[error("failed to create container {name}: {reason}")]
    ContainerCreateFailed {
        /// The container name.
        name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Failed to start a container.
    #[error("failed to start container {id}: {reason}")]
    ContainerStartFailed {
        /// The container ID.
        id: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Container or network not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested information is not available, e.g. health for a
    /// container without a health probe.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Operation exceeded its deadline.
    #[error("timeout waiting for {condition}")]
    Timeout {
        /// The condition that timed out.
        condition: String,
    },

    /// Engine API error.
    #[error("runtime API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Creates an image-pull failure.
    pub fn image_pull_failed(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImagePullFailed {
            image: image.into(),
            reason: reason.into(),
        }
    }

    /// Creates a network-create failure.
    pub fn network_create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkCreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a container-create failure.
    pub fn container_create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContainerCreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a container-start failure.
    pub fn container_start_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContainerStartFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable(what.into())
    }

    /// Creates a timeout error.
    pub fn timeout(condition: impl Into<String>) -> Self {
        Self::Timeout {
            condition: condition.into(),
        }
    }

    /// Returns true if this is a not-found error, including the API's own
    /// 404 responses.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => *status_code == 404,
            _ => false,
        }
    }
}

impl From<RuntimeError> for wirelab_core::LabError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::ImagePullFailed { .. } | RuntimeError::NetworkCreateFailed { .. } => {
                wirelab_core::LabError::Resource(err.to_string())
            }
            other => wirelab_core::LabError::Runtime(other.to_string()),
        }
    }
}
