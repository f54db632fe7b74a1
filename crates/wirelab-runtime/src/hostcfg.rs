//! Host-side tuning applied after the management network exists.
//!
//! Each action is best-effort: a failure is logged as a warning and does
//! not fail the network-create call.

use std::process::Command;

use tracing::{debug, warn};

/// Bridge group_fwd_mask value that forwards LLDP frames.
const LLDP_FWD_MASK: &str = "16384";

/// Applies the post-create host actions for the management bridge:
/// disables reverse-path filtering, enables LLDP forwarding, disables TX
/// checksum offload and installs firewall forward-accept rules.
pub fn tune_bridge(bridge: &str) {
    debug!(bridge = %bridge, "applying host network tuning");

    for scope in ["all", "default"] {
        let path = format!("/proc/sys/net/ipv4/conf/{}/rp_filter", scope);
        if let Err(err) = std::fs::write(&path, "0") {
            warn!(scope = %scope, error = %err, "failed to disable reverse-path filtering");
        }
    }

    let fwd_mask = format!("/sys/class/net/{}/bridge/group_fwd_mask", bridge);
    if let Err(err) = std::fs::write(&fwd_mask, LLDP_FWD_MASK) {
        warn!(bridge = %bridge, error = %err, "failed to enable LLDP forwarding on bridge");
    }

    if let Err(err) = wirelab_netlink::ethtool::tx_checksum_off(None, bridge) {
        warn!(bridge = %bridge, error = %err, "failed to disable TX checksum offloading");
    }

    for direction in ["-i", "-o"] {
        if let Err(err) = ensure_forward_rule(bridge, direction) {
            warn!(bridge = %bridge, error = %err, "failed to install forward-accept rule");
        }
    }
}

/// Removes the forward-accept rules installed by [`tune_bridge`].
pub fn remove_forward_rules(bridge: &str) {
    for direction in ["-i", "-o"] {
        let status = Command::new("iptables")
            .args(["-D", "FORWARD", direction, bridge, "-j", "ACCEPT"])
            .output();
        if let Err(err) = status {
            warn!(bridge = %bridge, error = %err, "failed to remove forward-accept rule");
        }
    }
}

fn ensure_forward_rule(bridge: &str, direction: &str) -> std::io::Result<()> {
    let exists = Command::new("iptables")
        .args(["-C", "FORWARD", direction, bridge, "-j", "ACCEPT"])
        .output()?
        .status
        .success();
    if exists {
        return Ok(());
    }
    let output = Command::new("iptables")
        .args(["-I", "FORWARD", direction, bridge, "-j", "ACCEPT"])
        .output()?;
    if !output.status.success() {
        return Err(std::io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}
