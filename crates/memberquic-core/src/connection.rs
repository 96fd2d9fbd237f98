//! Helpers over established quinn connections.

use memberquic_proto::tls::cert_extract::peer_common_name;
use rustls_pki_types::CertificateDer;

use crate::error::{Result, TransportError};

/// A connection is alive until quinn records a close reason for it.
pub fn is_alive(conn: &quinn::Connection) -> bool {
    conn.close_reason().is_none()
}

/// Extract the peer's node id (leaf certificate Common Name) from a
/// connection's TLS session.
///
/// Recomputed on every call from the live session; nothing is cached.
pub fn node_id_from_conn(conn: &quinn::Connection) -> Result<String> {
    let identity = conn
        .peer_identity()
        .ok_or_else(|| TransportError::PeerIdentity("no peer identity available".into()))?;

    let certs = identity
        .downcast::<Vec<CertificateDer<'static>>>()
        .map_err(|_| TransportError::PeerIdentity("failed to downcast peer identity".into()))?;

    peer_common_name(certs.as_slice()).map_err(|e| TransportError::PeerIdentity(e.to_string()))
}
