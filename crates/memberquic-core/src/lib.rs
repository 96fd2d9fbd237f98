//! memberquic transport core.
//!
//! Carries a gossip membership protocol over one QUIC endpoint instead of a
//! UDP socket plus TCP listener:
//!
//! - Connection pool (one live connection per peer address, deduplicated dials)
//! - Datagram-first packet delivery with a framed-stream fallback
//! - Per-connection receive loops feeding packet and stream queues
//! - Stream adapter with read/write deadlines
//! - The membership-engine transport contract ([`Transport`],
//!   [`NodeAwareTransport`])

pub mod accept;
pub mod advertise;
pub mod config;
pub mod connection;
pub mod contract;
pub mod datagram;
pub mod endpoint;
pub mod error;
pub mod pool;
pub mod queue;
pub mod stream_conn;
pub mod transport;

pub use config::Config;
pub use contract::{Address, NodeAwareTransport, Packet, Transport};
pub use error::TransportError;
pub use pool::ConnPool;
pub use queue::EventQueue;
pub use stream_conn::StreamConn;
pub use transport::QuicTransport;
