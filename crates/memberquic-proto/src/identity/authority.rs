//! Self-signed certificate authority for a memberquic cluster.
//!
//! Reference: `rcgen` crate (rustls team, MIT/Apache-2.0)
//! <https://github.com/rustls/rcgen>

use std::time::Duration;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256,
};

use crate::error::{ProtoError, Result};
use crate::identity::{random_serial, validity_window};

/// A cluster CA: ECDSA P-256 key plus self-signed certificate.
///
/// Node certificates are issued with [`NodeCertificate::generate`]
/// (see [`crate::identity::NodeCertificate`]).
pub struct CertificateAuthority {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl CertificateAuthority {
    /// Generate a new CA for the given organization, valid for `validity`
    /// from now (backdated by one minute).
    pub fn generate(org: &str, validity: Duration) -> Result<Self> {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| ProtoError::KeyGeneration(e.to_string()))?;

        let (not_before, not_after) = validity_window(validity)?;

        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| ProtoError::CertificateGeneration(format!("invalid CA params: {e}")))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, org);
        params.distinguished_name = dn;
        params.serial_number = Some(random_serial());
        params.not_before = not_before;
        params.not_after = not_after;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let cert = params
            .self_signed(&key)
            .map_err(|e| ProtoError::CertificateGeneration(e.to_string()))?;

        Ok(Self { cert, key })
    }

    /// Load a previously generated CA from its PEM certificate and key.
    ///
    /// The certificate is re-issued in memory from the parsed parameters and
    /// the original key, so it can sign node certificates again.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key = KeyPair::from_pem(key_pem)
            .map_err(|e| ProtoError::InvalidAuthority(format!("CA key: {e}")))?;
        let params = CertificateParams::from_ca_cert_pem(cert_pem)
            .map_err(|e| ProtoError::InvalidAuthority(format!("CA certificate: {e}")))?;
        let cert = params
            .self_signed(&key)
            .map_err(|e| ProtoError::InvalidAuthority(e.to_string()))?;
        Ok(Self { cert, key })
    }

    /// PEM-encoded CA certificate (distribute to every node as trust root).
    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    /// PEM-encoded PKCS#8 CA private key.
    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    /// DER-encoded CA certificate.
    pub fn der(&self) -> &[u8] {
        self.cert.der()
    }

    pub(crate) fn cert(&self) -> &rcgen::Certificate {
        &self.cert
    }

    pub(crate) fn key(&self) -> &KeyPair {
        &self.key
    }
}
