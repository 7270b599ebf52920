//! Signing keys and the key-pair backed [`CryptoCapability`].
//!
//! ## Supported keys
//!
//! - ECDSA P-256 (`ecdsa-sha256`) and P-384 (`ecdsa-sha384`), PKCS#8
//! - RSA (`rsa-sha256`), PKCS#8 or PKCS#1
//!
//! ECDSA signatures use the fixed `r || s` encoding XML-DSig expects.

use std::path::Path;

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{
        self, EcdsaKeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
        ECDSA_P384_SHA384_FIXED_SIGNING,
    },
};
use base64::Engine;

use crate::algorithm::SignatureAlgorithm;
use crate::capability::{CryptoCapability, CryptoError, CryptoResult};
use crate::certificate::{pem_to_der, Certificate};

/// A private signing key.
pub enum SigningKey {
    /// ECDSA key pair.
    Ecdsa {
        /// The aws-lc-rs key pair.
        key_pair: EcdsaKeyPair,
        /// The matching signature algorithm.
        algorithm: SignatureAlgorithm,
    },
    /// RSA key pair.
    Rsa(RsaKeyPair),
}

impl SigningKey {
    /// Loads a key from DER (PKCS#8, or PKCS#1 for RSA).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a supported ECDSA or RSA key.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        if let Ok(key_pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, der) {
            return Ok(Self::Ecdsa {
                key_pair,
                algorithm: SignatureAlgorithm::EcdsaSha256,
            });
        }
        if let Ok(key_pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_FIXED_SIGNING, der) {
            return Ok(Self::Ecdsa {
                key_pair,
                algorithm: SignatureAlgorithm::EcdsaSha384,
            });
        }

        let key_pair = RsaKeyPair::from_pkcs8(der)
            .or_else(|_| RsaKeyPair::from_der(der))
            .map_err(|e| CryptoError::InvalidKey(format!("not an ECDSA or RSA key: {e}")))?;
        Ok(Self::Rsa(key_pair))
    }

    /// Loads a key from PEM.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM or the key inside is malformed.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        Self::from_der(&pem_to_der(pem)?)
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ecdsa { algorithm, .. } => *algorithm,
            Self::Rsa(_) => SignatureAlgorithm::RsaSha256,
        }
    }

    /// Returns the raw public key bits.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        match self {
            Self::Ecdsa { key_pair, .. } => key_pair.public_key().as_ref(),
            Self::Rsa(key_pair) => key_pair.public_key().as_ref(),
        }
    }

    /// Returns a short identifier derived from the public key.
    #[must_use]
    pub fn key_id(&self) -> String {
        generate_key_id(self.public_key())
    }

    /// Signs the given data.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let rng = SystemRandom::new();
        match self {
            Self::Ecdsa { key_pair, .. } => {
                let signature = key_pair
                    .sign(&rng, data)
                    .map_err(|e| CryptoError::Signing(format!("ECDSA signing failed: {e}")))?;
                Ok(signature.as_ref().to_vec())
            }
            Self::Rsa(key_pair) => {
                let mut signature = vec![0u8; key_pair.public_modulus_len()];
                key_pair
                    .sign(&signature::RSA_PKCS1_SHA256, &rng, data, &mut signature)
                    .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;
                Ok(signature)
            }
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm())
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

/// A [`CryptoCapability`] backed by a local key pair and its certificate.
#[derive(Debug)]
pub struct KeyPairCapability {
    key: SigningKey,
    certificate: Certificate,
    next_certificate: Option<Certificate>,
}

impl KeyPairCapability {
    /// Pairs a key with its certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyMismatch`] if the certificate carries a
    /// different public key.
    pub fn new(key: SigningKey, certificate: Certificate) -> CryptoResult<Self> {
        if key.public_key() != certificate.public_key() {
            return Err(CryptoError::KeyMismatch(certificate.subject().to_string()));
        }
        Ok(Self {
            key,
            certificate,
            next_certificate: None,
        })
    }

    /// Announces the certificate of the key that will replace this one.
    #[must_use]
    pub fn with_next_certificate(mut self, certificate: Certificate) -> Self {
        self.next_certificate = Some(certificate);
        self
    }

    /// Loads key and certificates from files (PEM or DER).
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or if the key
    /// does not match the certificate.
    pub fn from_files(
        key_path: impl AsRef<Path>,
        certificate_path: impl AsRef<Path>,
        next_certificate_path: Option<&Path>,
    ) -> CryptoResult<Self> {
        let key_bytes = std::fs::read(key_path)?;
        let key = if is_pem(&key_bytes) {
            SigningKey::from_pem(&String::from_utf8_lossy(&key_bytes))?
        } else {
            SigningKey::from_der(&key_bytes)?
        };

        let capability = Self::new(key, read_certificate(certificate_path.as_ref())?)?;
        tracing::debug!(
            key_id = %capability.key.key_id(),
            subject = %capability.certificate.subject(),
            "loaded signing key"
        );
        match next_certificate_path {
            Some(path) => Ok(capability.with_next_certificate(read_certificate(path)?)),
            None => Ok(capability),
        }
    }
}

impl CryptoCapability for KeyPairCapability {
    fn sign(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.key.sign(data)
    }

    fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    fn next_certificate(&self) -> Option<&Certificate> {
        self.next_certificate.as_ref()
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }
}

fn is_pem(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(5)
        .eq(b"-----".iter())
}

fn read_certificate(path: &Path) -> CryptoResult<Certificate> {
    let bytes = std::fs::read(path)?;
    if is_pem(&bytes) {
        Certificate::from_pem(&String::from_utf8_lossy(&bytes))
    } else {
        Certificate::from_der(&bytes)
    }
}

/// Generates a key ID from the public key bytes.
fn generate_key_id(public_key: &[u8]) -> String {
    let hash = crate::sha256(public_key);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&hash[..8])
}
