//! Waiter for external containers referenced by `network-mode:
//! container:<name>`.
//!
//! Containers that are not lab-managed cannot be tracked through the
//! dependency manager; the engine polls the runtime for them instead.
//! A budget expiry leaves the dependent node unscheduled and is reported
//! as a warning, not a fatal error.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wirelab_core::error::{LabError, Result};
use wirelab_runtime::{ContainerRuntime, ContainerStatus};

/// Polling configuration for external dependencies.
#[derive(Debug, Clone)]
pub struct ExternalWaiter {
    /// How long to wait for the external container overall.
    pub budget: Duration,
    /// How often to poll the runtime.
    pub frequency: Duration,
}

impl Default for ExternalWaiter {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(15 * 60),
            frequency: Duration::from_secs(1),
        }
    }
}

impl ExternalWaiter {
    /// Polls until the external container is running, the budget
    /// expires, or the root context is cancelled.
    pub async fn wait(
        &self,
        runtime: &dyn ContainerRuntime,
        node: &str,
        container: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.frequency);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(LabError::Cancelled),
                _ = ticker.tick() => {}
            }

            if runtime.get_status(container).await == ContainerStatus::Running {
                info!(
                    node = %node,
                    container = %container,
                    "external container is running, node can start"
                );
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed >= self.budget {
                error!(
                    node = %node,
                    container = %container,
                    waited = ?elapsed,
                    "external dependency did not come up, giving up"
                );
                return Err(LabError::runtime(format!(
                    "external container {:?} not running after {:?}",
                    container, elapsed
                )));
            }

            info!(
                node = %node,
                container = %container,
                waited = elapsed.as_secs(),
                "external container not running yet, retrying"
            );
        }
    }
}
