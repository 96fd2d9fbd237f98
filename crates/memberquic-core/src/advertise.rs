//! Choosing the address a node advertises to the rest of the cluster.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Resolve the `(ip, port)` to advertise.
///
/// An explicit `ip` is used as is. Otherwise the bound IP is used, unless it
/// is the unspecified address, in which case the first private (RFC 1918)
/// IPv4 interface address is picked. A `port` of 0 means the bound port.
pub fn advertise_addr(bound: SocketAddr, ip: Option<IpAddr>, port: u16) -> Result<(IpAddr, u16)> {
    let ip = match ip {
        Some(ip) => ip,
        None if bound.ip().is_unspecified() => {
            let interfaces = if_addrs::get_if_addrs().map_err(TransportError::Interfaces)?;
            let ip = first_private_ipv4(interfaces.iter().map(|iface| iface.ip()))
                .ok_or(TransportError::NoPrivateAddress)?;
            debug!(%ip, "advertising private interface address");
            IpAddr::V4(ip)
        }
        None => bound.ip(),
    };

    let port = if port == 0 { bound.port() } else { port };
    Ok((ip, port))
}

/// First RFC 1918 IPv4 address among `addrs`.
fn first_private_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if v4.is_private() => Some(v4),
        _ => None,
    })
}
