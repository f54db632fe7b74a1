//! Netlink and network-namespace helpers for wirelab.
//!
//! Everything here operates either in the host namespace or in an
//! arbitrary target namespace referenced by path. Namespace entry is
//! always scoped through [`netns::NetnsGuard`], which restores the
//! calling thread's original namespace on every exit path.
//!
//! Ordering contract for wires between managed nodes: both veth peers are
//! created once, in the host namespace, under random transport names; each
//! peer is then moved into its target namespace and only there renamed,
//! given its MAC and MTU, and brought up.

pub mod addr;
pub mod error;
pub mod ethtool;
pub mod macvlan;
pub mod netem;
pub mod netns;
pub mod veth;

pub use error::{NetlinkError, Result};
pub use macvlan::MacvlanMode;
pub use netns::{ns_handle, symlink_netns, unlink_netns, NetnsGuard};
