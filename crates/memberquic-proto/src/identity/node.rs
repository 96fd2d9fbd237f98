//! CA-issued node certificates.
//!
//! The node id goes into the subject Common Name; peers recover it with
//! [`crate::tls::cert_extract::common_name`]. IP SANs let dialers verify the
//! server by the IP address they connected to.

use std::net::IpAddr;
use std::time::Duration;

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType, PKCS_ECDSA_P256_SHA256,
};

use crate::error::{ProtoError, Result};
use crate::identity::authority::CertificateAuthority;
use crate::identity::{random_serial, validity_window};

/// A node's leaf certificate and private key, both PEM-encoded.
pub struct NodeCertificate {
    node_id: String,
    cert_der: Vec<u8>,
    cert_pem: String,
    key_pem: String,
}

impl NodeCertificate {
    /// Issue a certificate for `node_id` signed by `ca`, valid for `validity`.
    ///
    /// `ips` become IP subject alternative names. A node that will be dialed
    /// by IP must list that IP here or server verification fails.
    pub fn generate(
        ca: &CertificateAuthority,
        node_id: &str,
        ips: &[IpAddr],
        validity: Duration,
    ) -> Result<Self> {
        if node_id.is_empty() {
            return Err(ProtoError::CertificateGeneration(
                "node id must not be empty".into(),
            ));
        }

        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| ProtoError::KeyGeneration(e.to_string()))?;

        let (not_before, not_after) = validity_window(validity)?;

        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| ProtoError::CertificateGeneration(format!("invalid node params: {e}")))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, node_id);
        params.distinguished_name = dn;
        params.serial_number = Some(random_serial());
        params.not_before = not_before;
        params.not_after = not_after;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.subject_alt_names = ips.iter().copied().map(SanType::IpAddress).collect();

        let cert = params
            .signed_by(&key, ca.cert(), ca.key())
            .map_err(|e| ProtoError::CertificateGeneration(e.to_string()))?;

        Ok(Self {
            node_id: node_id.to_owned(),
            cert_der: cert.der().to_vec(),
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }

    /// The node id embedded as Common Name.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// DER-encoded certificate bytes.
    pub fn der(&self) -> &[u8] {
        &self.cert_der
    }

    /// PEM-encoded certificate.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// PEM-encoded PKCS#8 private key.
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use x509_parser::prelude::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn ca() -> CertificateAuthority {
        CertificateAuthority::generate("test-org", DAY).expect("CA generation")
    }

    #[test]
    fn leaf_carries_node_id_as_common_name() {
        let ca = ca();
        let node = NodeCertificate::generate(&ca, "node-1", &[], DAY).expect("node cert");
        assert_eq!(node.node_id(), "node-1");

        let (_, cert) = X509Certificate::from_der(node.der()).unwrap();
        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok());
        assert_eq!(cn, Some("node-1"));
        assert!(!cert.is_ca());
    }

    #[test]
    fn leaf_is_issued_by_ca() {
        let ca = ca();
        let node = NodeCertificate::generate(&ca, "node-1", &[], DAY).unwrap();

        let (_, ca_cert) = X509Certificate::from_der(ca.der()).unwrap();
        let (_, leaf) = X509Certificate::from_der(node.der()).unwrap();
        assert_eq!(leaf.issuer(), ca_cert.subject());
        leaf.verify_signature(Some(ca_cert.public_key()))
            .expect("leaf signature should verify with the CA key");
    }

    #[test]
    fn ip_sans_are_embedded() {
        let ca = ca();
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let node = NodeCertificate::generate(&ca, "node-1", &[loopback], DAY).unwrap();

        let (_, leaf) = X509Certificate::from_der(node.der()).unwrap();
        let san = leaf
            .subject_alternative_name()
            .expect("SAN parses")
            .expect("SAN present");
        let has_loopback = san
            .value
            .general_names
            .iter()
            .any(|name| matches!(name, GeneralName::IPAddress(bytes) if bytes[..] == [127, 0, 0, 1]));
        assert!(has_loopback);
    }

    #[test]
    fn empty_node_id_rejected() {
        let ca = ca();
        assert!(NodeCertificate::generate(&ca, "", &[], DAY).is_err());
    }

    #[test]
    fn each_node_gets_its_own_key() {
        let ca = ca();
        let a = NodeCertificate::generate(&ca, "node-a", &[], DAY).unwrap();
        let b = NodeCertificate::generate(&ca, "node-b", &[], DAY).unwrap();
        assert_ne!(a.key_pem(), b.key_pem());
        assert!(a.cert_pem().starts_with("-----BEGIN CERTIFICATE-----"));
    }
}
