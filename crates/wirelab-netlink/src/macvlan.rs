//! Macvlan creation on a host parent interface.

use std::fmt;
use std::str::FromStr;

use rtnetlink::Handle;
use tracing::debug;

use crate::error::{NetlinkError, Result};
use crate::veth::link_index;

/// Macvlan operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MacvlanMode {
    /// All macvlans on a parent can reach each other.
    #[default]
    Bridge,
    /// Traffic hairpins through the upstream switch.
    Vepa,
    /// Exclusive use of the parent interface.
    Passthru,
    /// No communication between macvlans on the same parent.
    Private,
    /// Source-MAC filtered.
    Source,
}

impl MacvlanMode {
    /// Kernel mode constant (MACVLAN_MODE_*).
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Private => 1,
            Self::Vepa => 2,
            Self::Bridge => 4,
            Self::Passthru => 8,
            Self::Source => 16,
        }
    }
}

impl FromStr for MacvlanMode {
    type Err = NetlinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "bridge" => Ok(Self::Bridge),
            "vepa" => Ok(Self::Vepa),
            "passthru" => Ok(Self::Passthru),
            "private" => Ok(Self::Private),
            "source" => Ok(Self::Source),
            other => Err(NetlinkError::UnknownMacvlanMode(other.to_string())),
        }
    }
}

impl fmt::Display for MacvlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bridge => "bridge",
            Self::Vepa => "vepa",
            Self::Passthru => "passthru",
            Self::Private => "private",
            Self::Source => "source",
        };
        write!(f, "{}", s)
    }
}

/// Creates a macvlan on top of `parent` in the namespace of `handle` and
/// returns its index. The parent's MTU is inherited unless `mtu` is given.
pub async fn create_macvlan(
    handle: &Handle,
    name: &str,
    parent: &str,
    mode: MacvlanMode,
    mtu: Option<u32>,
) -> Result<u32> {
    let parent_index = link_index(handle, parent).await?;
    debug!(name = %name, parent = %parent, mode = %mode, "creating macvlan");

    handle
        .link()
        .add()
        .macvlan(name.to_string(), parent_index, mode.as_u32())
        .execute()
        .await?;

    let index = link_index(handle, name).await?;
    if let Some(mtu) = mtu {
        handle.link().set(index).mtu(mtu).execute().await?;
    }
    Ok(index)
}

/// Returns the MTU of an interface, used to inherit the parent MTU.
pub async fn link_mtu(handle: &Handle, name: &str) -> Result<Option<u32>> {
    use futures::TryStreamExt;
    use netlink_packet_route::link::LinkAttribute;

    let mut links = handle.link().get().match_name(name.to_string()).execute();
    let msg = links
        .try_next()
        .await
        .map_err(|_| NetlinkError::LinkNotFound(name.to_string()))?
        .ok_or_else(|| NetlinkError::LinkNotFound(name.to_string()))?;
    for attr in msg.attributes {
        if let LinkAttribute::Mtu(mtu) = attr {
            return Ok(Some(mtu));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("bridge".parse::<MacvlanMode>().unwrap(), MacvlanMode::Bridge);
        assert_eq!("".parse::<MacvlanMode>().unwrap(), MacvlanMode::Bridge);
        assert_eq!("vepa".parse::<MacvlanMode>().unwrap(), MacvlanMode::Vepa);
        assert_eq!("source".parse::<MacvlanMode>().unwrap(), MacvlanMode::Source);
        assert!("hub".parse::<MacvlanMode>().is_err());
    }

    #[test]
    fn test_mode_kernel_constants() {
        assert_eq!(MacvlanMode::Private.as_u32(), 1);
        assert_eq!(MacvlanMode::Vepa.as_u32(), 2);
        assert_eq!(MacvlanMode::Bridge.as_u32(), 4);
        assert_eq!(MacvlanMode::Passthru.as_u32(), 8);
        assert_eq!(MacvlanMode::Source.as_u32(), 16);
    }
}
