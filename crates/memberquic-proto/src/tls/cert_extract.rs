//! Extract the subject Common Name from X.509 DER certificates.
//!
//! After a QUIC handshake the peer's certificate chain is available from the
//! session. The leaf's Common Name is the peer's node id.
//!
//! Reference: `x509-parser` crate (rusticata, MIT/Apache-2.0)

use x509_parser::prelude::*;

use crate::error::{ProtoError, Result};

/// Return the subject Common Name of a DER-encoded certificate.
///
/// Fails if the certificate cannot be parsed, has no Common Name, or the
/// Common Name is empty.
pub fn common_name(cert_der: &[u8]) -> Result<String> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| ProtoError::PeerIdentity(format!("X.509 parse error: {e}")))?;

    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .ok_or_else(|| ProtoError::PeerIdentity("peer certificate has no Common Name".into()))?
        .as_str()
        .map_err(|e| ProtoError::PeerIdentity(format!("Common Name is not a string: {e}")))?;

    if cn.is_empty() {
        return Err(ProtoError::PeerIdentity(
            "peer certificate has an empty Common Name".into(),
        ));
    }
    Ok(cn.to_owned())
}

/// Return the Common Name of the leaf of a peer certificate chain.
pub fn peer_common_name<C: AsRef<[u8]>>(chain: &[C]) -> Result<String> {
    let leaf = chain
        .first()
        .ok_or_else(|| ProtoError::PeerIdentity("no peer certificates".into()))?;
    common_name(leaf.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CertificateAuthority, NodeCertificate};
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn extracts_node_id() {
        let ca = CertificateAuthority::generate("test-org", DAY).unwrap();
        let node = NodeCertificate::generate(&ca, "node-7", &[], DAY).unwrap();
        assert_eq!(common_name(node.der()).unwrap(), "node-7");
    }

    #[test]
    fn leaf_of_chain_wins() {
        let ca = CertificateAuthority::generate("test-org", DAY).unwrap();
        let node = NodeCertificate::generate(&ca, "node-7", &[], DAY).unwrap();
        let chain = vec![node.der().to_vec(), ca.der().to_vec()];
        assert_eq!(peer_common_name(&chain).unwrap(), "node-7");
    }

    #[test]
    fn ca_without_common_name_is_rejected() {
        let ca = CertificateAuthority::generate("test-org", DAY).unwrap();
        assert!(common_name(ca.der()).is_err());
    }

    #[test]
    fn empty_chain_is_rejected() {
        let chain: Vec<Vec<u8>> = Vec::new();
        assert!(peer_common_name(&chain).is_err());
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(common_name(b"not a certificate").is_err());
        assert!(common_name(b"").is_err());
    }
}
