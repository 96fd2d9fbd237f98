//! Mutual-TLS configuration builder.
//!
//! A QUIC endpoint both listens and dials, so a node needs both halves of a
//! TLS configuration. [`MutualTlsConfig`] bundles a `rustls::ServerConfig`
//! and a `rustls::ClientConfig` built from the same node certificate and
//! cluster CA.
//!
//! Both halves enforce:
//! - TLS 1.3 only (required by QUIC)
//! - Ring crypto provider
//! - Peer certificates chained to the cluster CA (client certs required)

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{ProtoError, Result};

/// Server and client TLS configuration for one node.
///
/// Treated as an opaque object by the transport, which only clones it and
/// stamps its ALPN identifier on the copies.
#[derive(Clone, Debug)]
pub struct MutualTlsConfig {
    server: Arc<rustls::ServerConfig>,
    client: Arc<rustls::ClientConfig>,
}

impl MutualTlsConfig {
    /// Assemble from pre-built rustls configs.
    pub fn new(server: Arc<rustls::ServerConfig>, client: Arc<rustls::ClientConfig>) -> Self {
        Self { server, client }
    }

    /// The server (listening) half.
    pub fn server(&self) -> &Arc<rustls::ServerConfig> {
        &self.server
    }

    /// The client (dialing) half.
    pub fn client(&self) -> &Arc<rustls::ClientConfig> {
        &self.client
    }

    /// Clone both halves with `alpn` as the only application protocol.
    pub fn with_alpn(&self, alpn: &[u8]) -> Self {
        let mut server = (*self.server).clone();
        server.alpn_protocols = vec![alpn.to_vec()];
        let mut client = (*self.client).clone();
        client.alpn_protocols = vec![alpn.to_vec()];
        Self {
            server: Arc::new(server),
            client: Arc::new(client),
        }
    }
}

/// Build a mutual-TLS configuration from PEM inputs.
///
/// - `cert_pem`: the node certificate (chain), leaf first
/// - `key_pem`: the node's private key
/// - `ca_pem`: the cluster CA, used to verify both servers and clients
pub fn mutual_tls_config(
    cert_pem: &[u8],
    key_pem: &[u8],
    ca_pem: &[u8],
) -> Result<MutualTlsConfig> {
    let cert_chain = parse_certs(cert_pem, "node certificate")?;
    let private_key = PrivateKeyDer::from_pem_slice(key_pem)
        .map_err(|e| ProtoError::TlsConfiguration(format!("node key: {e}")))?;

    let mut roots = RootCertStore::empty();
    for ca in parse_certs(ca_pem, "CA certificate")? {
        roots
            .add(ca)
            .map_err(|e| ProtoError::TlsConfiguration(format!("CA certificate: {e}")))?;
    }
    let roots = Arc::new(roots);
    let provider = ring_provider();

    let client_verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::clone(&roots), Arc::clone(&provider))
            .build()
            .map_err(|e| ProtoError::TlsConfiguration(format!("client verifier: {e}")))?;

    let server = rustls::ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ProtoError::TlsConfiguration(format!("TLS version config: {e}")))?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(cert_chain.clone(), private_key.clone_key())
        .map_err(|e| ProtoError::TlsConfiguration(format!("server cert config: {e}")))?;

    let client = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ProtoError::TlsConfiguration(format!("TLS version config: {e}")))?
        .with_root_certificates(roots)
        .with_client_auth_cert(cert_chain, private_key)
        .map_err(|e| ProtoError::TlsConfiguration(format!("client cert config: {e}")))?;

    Ok(MutualTlsConfig::new(Arc::new(server), Arc::new(client)))
}

fn ring_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn parse_certs(pem: &[u8], what: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ProtoError::TlsConfiguration(format!("{what}: {e}")))?;
    if certs.is_empty() {
        return Err(ProtoError::TlsConfiguration(format!(
            "{what}: no PEM certificates found"
        )));
    }
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CertificateAuthority, NodeCertificate};
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn make_config() -> MutualTlsConfig {
        let ca = CertificateAuthority::generate("test-org", DAY).expect("CA");
        let node = NodeCertificate::generate(&ca, "node-1", &[], DAY).expect("node cert");
        mutual_tls_config(
            node.cert_pem().as_bytes(),
            node.key_pem().as_bytes(),
            ca.cert_pem().as_bytes(),
        )
        .expect("config should build")
    }

    #[test]
    fn config_builds_successfully() {
        let config = make_config();
        assert!(config.server().alpn_protocols.is_empty());
        assert!(config.client().alpn_protocols.is_empty());
    }

    #[test]
    fn with_alpn_stamps_both_halves() {
        let config = make_config().with_alpn(b"memberquic/1");
        assert_eq!(config.server().alpn_protocols, vec![b"memberquic/1".to_vec()]);
        assert_eq!(config.client().alpn_protocols, vec![b"memberquic/1".to_vec()]);
    }

    #[test]
    fn with_alpn_leaves_original_untouched() {
        let original = make_config();
        let _stamped = original.with_alpn(b"memberquic/1");
        assert!(original.server().alpn_protocols.is_empty());
    }

    #[test]
    fn rejects_missing_ca() {
        let ca = CertificateAuthority::generate("test-org", DAY).unwrap();
        let node = NodeCertificate::generate(&ca, "node-1", &[], DAY).unwrap();
        let result = mutual_tls_config(node.cert_pem().as_bytes(), node.key_pem().as_bytes(), b"");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_garbage_key() {
        let ca = CertificateAuthority::generate("test-org", DAY).unwrap();
        let node = NodeCertificate::generate(&ca, "node-1", &[], DAY).unwrap();
        let result = mutual_tls_config(
            node.cert_pem().as_bytes(),
            b"not a key",
            ca.cert_pem().as_bytes(),
        );
        assert!(result.is_err());
    }
}
