//! The wire seam between link variants and the kernel.
//!
//! Link deployment is expressed against the [`Wire`] trait so the
//! ordering and idempotency logic can be exercised without netlink
//! privileges; [`KernelWire`] is the real implementation on top of the
//! netlink helpers.

use async_trait::async_trait;
use wirelab_core::Result;
use wirelab_netlink::macvlan::{create_macvlan, MacvlanMode};
use wirelab_netlink::veth::{create_veth, link_index, move_to_netns, remove_interface_if_exists, rename_and_up};
use wirelab_netlink::ns_handle;

/// Kernel operations needed to materialise a wire.
#[async_trait]
pub trait Wire: Send + Sync {
    /// Creates a veth pair in the host namespace under the given
    /// transport names.
    async fn create_veth(&self, name_a: &str, name_b: &str, mtu: u32) -> Result<()>;

    /// Moves a host-namespace interface into the namespace at `ns_path`.
    async fn move_to_netns(&self, name: &str, ns_path: &str) -> Result<()>;

    /// Inside the namespace at `ns_path` (host when `None`): renames
    /// `current` to `desired`, applies MAC and MTU, optionally enslaves
    /// to `master` and sets the interface up. Returns the interface's
    /// hardware address afterwards.
    async fn finish_endpoint(
        &self,
        ns_path: Option<&str>,
        current: &str,
        desired: &str,
        mac: Option<[u8; 6]>,
        mtu: Option<u32>,
        master: Option<&str>,
    ) -> Result<Option<[u8; 6]>>;

    /// Creates a macvlan on a host parent interface under a transport
    /// name.
    async fn create_macvlan(
        &self,
        name: &str,
        parent: &str,
        mode: MacvlanMode,
        mtu: Option<u32>,
    ) -> Result<()>;

    /// Deletes an interface if it exists; missing interfaces and missing
    /// namespaces are success.
    async fn remove_if_exists(&self, ns_path: Option<&str>, name: &str) -> Result<()>;
}

/// The real wire, backed by rtnetlink.
#[derive(Debug, Default)]
pub struct KernelWire;

#[async_trait]
impl Wire for KernelWire {
    async fn create_veth(&self, name_a: &str, name_b: &str, mtu: u32) -> Result<()> {
        let handle = ns_handle(None)?;
        create_veth(&handle, name_a, name_b, mtu).await?;
        Ok(())
    }

    async fn move_to_netns(&self, name: &str, ns_path: &str) -> Result<()> {
        let handle = ns_handle(None)?;
        let index = link_index(&handle, name).await?;
        move_to_netns(&handle, index, ns_path).await?;
        Ok(())
    }

    async fn finish_endpoint(
        &self,
        ns_path: Option<&str>,
        current: &str,
        desired: &str,
        mac: Option<[u8; 6]>,
        mtu: Option<u32>,
        master: Option<&str>,
    ) -> Result<Option<[u8; 6]>> {
        Ok(rename_and_up(ns_path, current, desired, mac, mtu, master).await?)
    }

    async fn create_macvlan(
        &self,
        name: &str,
        parent: &str,
        mode: MacvlanMode,
        mtu: Option<u32>,
    ) -> Result<()> {
        let handle = ns_handle(None)?;
        create_macvlan(&handle, name, parent, mode, mtu).await?;
        Ok(())
    }

    async fn remove_if_exists(&self, ns_path: Option<&str>, name: &str) -> Result<()> {
        remove_interface_if_exists(ns_path, name).await?;
        Ok(())
    }
}
