//! Error types for the memberquic protocol layer.

use thiserror::Error;

/// Errors that can occur within the `memberquic-proto` crate.
#[derive(Debug, Error)]
pub enum ProtoError {
    // --- Identity ---
    #[error("failed to generate key pair: {0}")]
    KeyGeneration(String),

    #[error("failed to generate X.509 certificate: {0}")]
    CertificateGeneration(String),

    #[error("failed to parse certificate authority: {0}")]
    InvalidAuthority(String),

    // --- TLS ---
    #[error("TLS configuration error: {0}")]
    TlsConfiguration(String),

    #[error("failed to extract peer identity: {0}")]
    PeerIdentity(String),

    // --- Framing ---
    #[error("frame of {len} bytes exceeds the {max}-byte ceiling")]
    FrameTooLarge { len: usize, max: usize },
}

/// Result type alias using [`ProtoError`].
pub type Result<T> = std::result::Result<T, ProtoError>;
