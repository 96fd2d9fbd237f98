//! memberquic shared protocol layer.
//!
//! Used by `memberquic-core` and by anything that provisions node identities:
//!
//! - Fallback frame codec for packets carried on unidirectional streams
//! - CA and node certificate generation for mutual TLS
//! - Mutual-TLS config builder and peer identity extraction

pub mod codec;
pub mod error;
pub mod identity;
pub mod tls;
