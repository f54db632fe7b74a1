//! Offload tuning via ethtool.

use std::process::Command;

use crate::error::{NetlinkError, Result};
use crate::netns::in_netns;

/// Disables TX checksum offloading on `iface` in the namespace at
/// `ns_path` (host namespace when `None`). Checksums must be computed in
/// software for veth-wired network operating systems to validate them.
pub fn tx_checksum_off(ns_path: Option<&str>, iface: &str) -> Result<()> {
    in_netns(ns_path, || {
        let output = Command::new("ethtool")
            .args(["-K", iface, "tx", "off"])
            .output()?;
        if !output.status.success() {
            return Err(NetlinkError::Command(format!(
                "ethtool -K {} tx off: {}",
                iface,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    })
}
