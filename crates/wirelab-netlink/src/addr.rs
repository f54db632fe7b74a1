//! Interface address queries.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use futures::TryStreamExt;
use netlink_packet_route::address::AddressAttribute;
use rtnetlink::Handle;

use crate::error::Result;
use crate::veth::link_index;

/// Reads the first IPv4 and IPv6 addresses assigned to an interface in the
/// host namespace. Link-local IPv6 addresses are skipped. Used to populate
/// the management-network gateway fields from the bridge.
pub async fn first_link_ips(
    handle: &Handle,
    name: &str,
) -> Result<(Option<Ipv4Addr>, Option<Ipv6Addr>)> {
    let index = link_index(handle, name).await?;

    let mut v4: Option<Ipv4Addr> = None;
    let mut v6: Option<Ipv6Addr> = None;

    let mut addrs = handle
        .address()
        .get()
        .set_link_index_filter(index)
        .execute();

    while let Some(msg) = addrs.try_next().await? {
        for attr in &msg.attributes {
            if let AddressAttribute::Address(addr) = attr {
                match addr {
                    IpAddr::V4(a) if v4.is_none() => v4 = Some(*a),
                    IpAddr::V6(a) if v6.is_none() && !is_link_local(*a) => v6 = Some(*a),
                    _ => {}
                }
            }
        }
        if v4.is_some() && v6.is_some() {
            break;
        }
    }
    Ok((v4, v6))
}

fn is_link_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_local_detection() {
        assert!(is_link_local("fe80::1".parse().unwrap()));
        assert!(!is_link_local("2001:172:20:20::1".parse().unwrap()));
        assert!(!is_link_local("::1".parse().unwrap()));
    }
}
