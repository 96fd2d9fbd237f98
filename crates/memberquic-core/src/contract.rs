//! The transport contract a gossip membership engine consumes.
//!
//! The engine only needs to send packets, dial streams, receive both, pick an
//! advertise address, and shut down. [`QuicTransport`](crate::QuicTransport)
//! implements both traits.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::queue::EventQueue;
use crate::stream_conn::StreamConn;

/// A peer address as the membership engine knows it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Address {
    /// Textual `host:port`.
    pub addr: String,
    /// Node name, if known. Informational only; routing uses `addr`.
    pub name: String,
}

impl Address {
    pub fn new(addr: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            name: name.into(),
        }
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Self::new(addr, "")
    }
}

/// An inbound packet, whether it arrived as a datagram or a fallback frame.
#[derive(Clone, Debug)]
pub struct Packet {
    /// Payload bytes, exactly as sent.
    pub buf: Bytes,
    /// Remote address of the connection it arrived on.
    pub from: SocketAddr,
    /// When the packet was received.
    pub timestamp: Instant,
}

impl Packet {
    pub(crate) fn new(buf: Bytes, from: SocketAddr) -> Self {
        Self {
            buf,
            from,
            timestamp: Instant::now(),
        }
    }
}

/// Packet and stream transport used by the membership engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address and port to advertise to other members.
    ///
    /// An explicit `ip` wins. Otherwise the bound address is used, or a
    /// private interface address if bound to the unspecified address. A
    /// `port` of 0 means the bound port.
    fn final_advertise_addr(&self, ip: Option<IpAddr>, port: u16) -> Result<(IpAddr, u16)>;

    /// Send a packet to `addr`, returning when it was handed to the network.
    async fn write_to(&self, buf: &[u8], addr: &str) -> Result<Instant>;

    /// Inbound packets.
    fn packet_ch(&self) -> &EventQueue<Packet>;

    /// Open a reliable stream to `addr`. A nonzero `timeout` becomes an
    /// absolute deadline on the returned stream; it does not bound the dial.
    async fn dial_timeout(&self, addr: &str, timeout: Duration) -> Result<StreamConn>;

    /// Inbound streams opened by peers.
    fn stream_ch(&self) -> &EventQueue<StreamConn>;

    /// Stop the transport and wait for every worker to exit. Idempotent.
    async fn shutdown(&self) -> Result<()>;
}

/// Transport variant that receives full peer addresses.
#[async_trait]
pub trait NodeAwareTransport: Transport {
    async fn write_to_address(&self, buf: &[u8], addr: &Address) -> Result<Instant>;

    async fn dial_address_timeout(&self, addr: &Address, timeout: Duration)
        -> Result<StreamConn>;
}
