//! Netem impairments on node interfaces.
//!
//! Impairments are applied with `tc(8)` executed while the calling thread
//! holds the namespace guard, so the qdisc lands on the interface inside
//! the node's namespace.

use std::process::Command;
use std::time::Duration;

use tracing::warn;

use crate::error::{NetlinkError, Result};
use crate::netns::in_netns;

/// Netem parameters for one interface.
#[derive(Debug, Clone, Default)]
pub struct NetemParams {
    /// Added one-way delay.
    pub delay: Option<Duration>,
    /// Delay variation; requires `delay`.
    pub jitter: Option<Duration>,
    /// Packet loss percentage, 0–100.
    pub loss: Option<f64>,
    /// Rate limit in kbit/s.
    pub rate_kbit: Option<u64>,
}

impl NetemParams {
    /// Returns true when no impairment is requested.
    pub fn is_empty(&self) -> bool {
        self.delay.is_none() && self.jitter.is_none() && self.loss.is_none() && self.rate_kbit.is_none()
    }

    /// Validates the parameter combination.
    pub fn validate(&self) -> Result<()> {
        if let Some(loss) = self.loss {
            if !(0.0..=100.0).contains(&loss) {
                return Err(NetlinkError::InvalidNetem(format!(
                    "loss must be between 0 and 100, got {}",
                    loss
                )));
            }
        }
        if self.jitter.is_some() && self.delay.is_none() {
            return Err(NetlinkError::InvalidNetem(
                "cannot set jitter without delay".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the `tc qdisc ... netem` argument tail.
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(delay) = self.delay {
            args.push("delay".to_string());
            args.push(format!("{}ms", delay.as_millis()));
            if let Some(jitter) = self.jitter {
                args.push(format!("{}ms", jitter.as_millis()));
            }
        }
        if let Some(loss) = self.loss {
            args.push("loss".to_string());
            args.push(format!("{:.3}%", loss));
        }
        if let Some(rate) = self.rate_kbit {
            args.push("rate".to_string());
            args.push(format!("{}kbit", rate));
        }
        args
    }
}

/// Replaces the root qdisc of `iface` in the namespace at `ns_path` with a
/// netem qdisc carrying the given impairments. An empty parameter set is a
/// warning and a no-op.
pub fn set_impairments(ns_path: Option<&str>, iface: &str, params: &NetemParams) -> Result<()> {
    params.validate()?;
    if params.is_empty() {
        warn!(iface = %iface, "no netem parameters (delay, jitter, loss, rate) set");
        return Ok(());
    }

    let mut args: Vec<String> = ["qdisc", "replace", "dev", iface, "root", "netem"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(params.to_args());

    in_netns(ns_path, || run_tc(&args)).map(|_| ())
}

/// Shows the qdisc configuration of `iface` in the namespace at `ns_path`.
pub fn show(ns_path: Option<&str>, iface: &str) -> Result<String> {
    let args: Vec<String> = ["qdisc", "show", "dev", iface]
        .iter()
        .map(|s| s.to_string())
        .collect();
    in_netns(ns_path, || run_tc(&args))
}

fn run_tc(args: &[String]) -> Result<String> {
    let output = Command::new("tc").args(args).output()?;
    if !output.status.success() {
        return Err(NetlinkError::Tc(format!(
            "tc {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_jitter_requires_delay() {
        let params = NetemParams {
            jitter: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = NetemParams {
            delay: Some(Duration::from_millis(10)),
            jitter: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_loss_bounds() {
        let params = NetemParams {
            loss: Some(150.0),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = NetemParams {
            loss: Some(12.5),
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_args_rendering() {
        let params = NetemParams {
            delay: Some(Duration::from_millis(10)),
            jitter: Some(Duration::from_millis(2)),
            loss: Some(1.0),
            rate_kbit: Some(10_000),
        };
        assert_eq!(
            params.to_args(),
            vec!["delay", "10ms", "2ms", "loss", "1.000%", "rate", "10000kbit"]
        );
    }

    #[test]
    fn test_empty_params_noop() {
        let params = NetemParams::default();
        assert!(params.is_empty());
        // no namespace entry, no tc invocation
        assert!(set_impairments(None, "lo", &params).is_ok());
    }
}
