//! TLS configuration for QUIC mutual TLS.
//!
//! - Mutual-TLS config builders (server and client halves, one CA)
//! - Peer identity extraction (subject Common Name from X.509 DER)

pub mod cert_extract;
pub mod config;

pub use config::{mutual_tls_config, MutualTlsConfig};
