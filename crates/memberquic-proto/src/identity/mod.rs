//! Node identity primitives: certificate authority and CA-issued node
//! certificates.
//!
//! Every cluster shares one CA. Each node holds a certificate signed by that
//! CA whose subject Common Name is the node's id; peers read that name back
//! from the TLS session after the handshake.

pub mod authority;
pub mod node;

pub use authority::CertificateAuthority;
pub use node::NodeCertificate;

use rcgen::SerialNumber;
use time::OffsetDateTime;

use crate::error::{ProtoError, Result};

/// Certificates are backdated by this much to tolerate small clock skew.
const BACKDATE: time::Duration = time::Duration::minutes(1);

/// Compute `(not_before, not_after)` for a certificate valid for `validity`
/// starting now.
fn validity_window(validity: std::time::Duration) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let now = OffsetDateTime::now_utc();
    let validity = time::Duration::try_from(validity)
        .map_err(|e| ProtoError::CertificateGeneration(format!("invalid validity: {e}")))?;
    let not_after = now
        .checked_add(validity)
        .ok_or_else(|| ProtoError::CertificateGeneration("validity overflows".into()))?;
    Ok((now - BACKDATE, not_after))
}

/// Random positive 128-bit serial number.
fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    // Keep the DER INTEGER positive.
    bytes[0] &= 0x7f;
    SerialNumber::from(bytes.to_vec())
}
