//! Signing identity: the transmitter's certificate and RSA private key.
//!
//! Loaded once at startup and shared read-only across transmissions. The
//! certificate is kept as DER for embedding as a security token; the key
//! is a PKCS#8 RSA private key, optionally passphrase-encrypted.

use crate::error::TransmitError;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::fs;
use std::path::Path;

/// Certificate plus private key.
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    certificate_der: Vec<u8>,
    private_key: RsaPrivateKey,
}

impl SigningIdentity {
    /// Load from a PEM certificate file and a PKCS#8 PEM key file.
    pub fn load(
        certificate_path: &Path,
        key_path: &Path,
        key_password: Option<&str>,
    ) -> Result<Self, TransmitError> {
        let cert_pem = fs::read(certificate_path).map_err(|e| {
            TransmitError::Credential(format!(
                "cannot read certificate {}: {e}",
                certificate_path.display()
            ))
        })?;
        let mut reader = std::io::BufReader::new(cert_pem.as_slice());
        let certificate_der = rustls_pemfile::certs(&mut reader)
            .next()
            .transpose()
            .map_err(|e| TransmitError::Credential(format!("certificate unreadable: {e}")))?
            .ok_or_else(|| {
                TransmitError::Credential(format!(
                    "no certificate found in {}",
                    certificate_path.display()
                ))
            })?
            .to_vec();

        let key_pem = fs::read_to_string(key_path).map_err(|e| {
            TransmitError::Credential(format!("cannot read key {}: {e}", key_path.display()))
        })?;
        let private_key = match key_password {
            Some(password) => RsaPrivateKey::from_pkcs8_encrypted_pem(&key_pem, password),
            None => RsaPrivateKey::from_pkcs8_pem(&key_pem),
        }
        .map_err(|e| TransmitError::Credential(format!("private key unusable: {e}")))?;

        Ok(Self {
            certificate_der,
            private_key,
        })
    }

    /// Build from already-loaded parts.
    pub fn from_parts(certificate_der: Vec<u8>, private_key: RsaPrivateKey) -> Self {
        Self {
            certificate_der,
            private_key,
        }
    }

    /// DER bytes of the certificate, as embedded in the security token.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}
