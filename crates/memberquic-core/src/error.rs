//! Error types for the transport core.

use thiserror::Error;

/// Errors that can occur in the QUIC transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("TLS config is required")]
    MissingTlsConfig,

    #[error("endpoint bind failed: {0}")]
    Bind(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("failed to resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },

    #[error("quinn connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("connection failed: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("datagram send failed: {0}")]
    SendDatagram(#[from] quinn::SendDatagramError),

    #[error("stream write failed: {0}")]
    StreamWrite(#[from] quinn::WriteError),

    #[error("stream I/O error: {0}")]
    StreamIo(String),

    #[error("failed to extract peer identity: {0}")]
    PeerIdentity(String),

    #[error("failed to list network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),

    #[error("no private IP address found")]
    NoPrivateAddress,

    #[error("protocol error: {0}")]
    Protocol(#[from] memberquic_proto::error::ProtoError),

    #[error("transport shutdown")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
