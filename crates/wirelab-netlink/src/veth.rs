//! Veth pair creation and interface plumbing.
//!
//! The deployment flow for a wire is: create both peers in the host
//! namespace under random transport names, move each peer into its target
//! namespace, then rename it to the desired interface name, apply MAC and
//! MTU, optionally enslave it to a bridge and bring it up. The rename must
//! happen after the move so the transport name never collides inside the
//! target namespace.

use std::fs::File;
use std::os::fd::AsRawFd;

use futures::TryStreamExt;
use netlink_packet_route::link::LinkAttribute;
use rand::Rng;
use rtnetlink::Handle;
use tracing::debug;

use crate::error::{NetlinkError, Result};
use crate::netns::ns_handle;

/// Generates a random transport interface name, unique enough to avoid
/// collision in the host namespace.
pub fn random_ifname() -> String {
    let mut rng = rand::thread_rng();
    format!("wl{:08x}", rng.gen::<u32>())
}

/// Looks up an interface index by name.
pub async fn link_index(handle: &Handle, name: &str) -> Result<u32> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    match links.try_next().await {
        Ok(Some(msg)) => Ok(msg.header.index),
        Ok(None) => Err(NetlinkError::LinkNotFound(name.to_string())),
        Err(rtnetlink::Error::NetlinkError(_)) => Err(NetlinkError::LinkNotFound(name.to_string())),
        Err(err) => Err(err.into()),
    }
}

/// Reads the hardware address of an interface by name.
pub async fn link_mac(handle: &Handle, name: &str) -> Result<Option<[u8; 6]>> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    let msg = links
        .try_next()
        .await
        .map_err(|_| NetlinkError::LinkNotFound(name.to_string()))?
        .ok_or_else(|| NetlinkError::LinkNotFound(name.to_string()))?;
    for attr in msg.attributes {
        if let LinkAttribute::Address(bytes) = attr {
            if bytes.len() == 6 {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&bytes);
                return Ok(Some(mac));
            }
        }
    }
    Ok(None)
}

/// Creates a veth pair in the namespace of `handle` and returns the
/// indexes of both sides.
pub async fn create_veth(handle: &Handle, name_a: &str, name_b: &str, mtu: u32) -> Result<(u32, u32)> {
    debug!(a = %name_a, b = %name_b, mtu, "creating veth pair");
    handle
        .link()
        .add()
        .veth(name_a.to_string(), name_b.to_string())
        .execute()
        .await?;

    let index_a = link_index(handle, name_a).await?;
    let index_b = link_index(handle, name_b).await?;

    for index in [index_a, index_b] {
        handle.link().set(index).mtu(mtu).execute().await?;
    }
    Ok((index_a, index_b))
}

/// Moves an interface into the namespace at `ns_path`.
pub async fn move_to_netns(handle: &Handle, index: u32, ns_path: &str) -> Result<()> {
    let ns_file = File::open(ns_path)?;
    handle
        .link()
        .set(index)
        .setns_by_fd(ns_file.as_raw_fd())
        .execute()
        .await?;
    debug!(index, ns = %ns_path, "moved interface to namespace");
    Ok(())
}

/// Inside the namespace at `ns_path` (host namespace when `None`):
/// renames `current` to `desired`, applies MAC and MTU if given, enslaves
/// the interface to `master` if given, and sets it up. Returns the
/// interface's hardware address after the change.
pub async fn rename_and_up(
    ns_path: Option<&str>,
    current: &str,
    desired: &str,
    mac: Option<[u8; 6]>,
    mtu: Option<u32>,
    master: Option<&str>,
) -> Result<Option<[u8; 6]>> {
    let handle = ns_handle(ns_path)?;
    let index = link_index(&handle, current).await?;

    let mut req = handle.link().set(index).name(desired.to_string());
    if let Some(mac) = mac {
        req = req.address(mac.to_vec());
    }
    if let Some(mtu) = mtu {
        req = req.mtu(mtu);
    }
    if let Some(master) = master {
        let master_index = link_index(&handle, master).await?;
        req = req.master(master_index);
    }
    req.up().execute().await?;

    debug!(
        from = %current,
        to = %desired,
        ns = ns_path.unwrap_or("host"),
        "interface renamed and up"
    );
    link_mac(&handle, desired).await
}

/// Deletes an interface from the namespace at `ns_path` if it exists.
/// A missing interface (or a missing namespace) is success.
pub async fn remove_interface_if_exists(ns_path: Option<&str>, name: &str) -> Result<()> {
    let handle = match ns_handle(ns_path) {
        Ok(handle) => handle,
        Err(NetlinkError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    match link_index(&handle, name).await {
        Ok(index) => {
            handle.link().del(index).execute().await?;
            debug!(name = %name, ns = ns_path.unwrap_or("host"), "interface removed");
            Ok(())
        }
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ifname_shape() {
        let name = random_ifname();
        assert!(name.starts_with("wl"));
        assert_eq!(name.len(), 10);
        // must fit IFNAMSIZ (15 chars + NUL)
        assert!(name.len() <= 15);
    }

    #[test]
    fn test_random_ifname_unique() {
        assert_ne!(random_ifname(), random_ifname());
    }
}
