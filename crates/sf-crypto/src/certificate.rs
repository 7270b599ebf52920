//! X.509 certificates as published in SAML metadata.
//!
//! Only the parts the engine needs are extracted at parse time: the subject,
//! the validity window and the subject public key. The DER is kept so the
//! certificate can be written back into metadata unchanged.

use std::fmt;

use aws_lc_rs::signature::{
    UnparsedPublicKey, VerificationAlgorithm, ECDSA_P256_SHA256_FIXED, ECDSA_P384_SHA384_FIXED,
    RSA_PKCS1_2048_8192_SHA256,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

use crate::algorithm::SignatureAlgorithm;
use crate::capability::{CryptoError, CryptoResult};
use crate::hash::sha256;

/// Length of an uncompressed P-256 point.
const P256_POINT_LEN: usize = 65;
/// Length of an uncompressed P-384 point.
const P384_POINT_LEN: usize = 97;

/// Kind of public key carried by a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyKind {
    /// ECDSA key on P-256.
    EcP256,
    /// ECDSA key on P-384.
    EcP384,
    /// RSA key.
    Rsa,
}

impl PublicKeyKind {
    /// Returns the signature algorithm used with this key kind.
    #[must_use]
    pub const fn signature_algorithm(self) -> SignatureAlgorithm {
        match self {
            Self::EcP256 => SignatureAlgorithm::EcdsaSha256,
            Self::EcP384 => SignatureAlgorithm::EcdsaSha384,
            Self::Rsa => SignatureAlgorithm::RsaSha256,
        }
    }
}

/// A parsed X.509 certificate.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_kind: PublicKeyKind,
    public_key: Vec<u8>,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the DER is malformed or the key type is unsupported.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;

        let validity = cert.validity();
        let not_before = timestamp(validity.not_before.timestamp())?;
        let not_after = timestamp(validity.not_after.timestamp())?;

        let spki = cert.public_key();
        let public_key = spki.subject_public_key.data.to_vec();
        let key_kind = match spki.parsed() {
            Ok(PublicKey::RSA(_)) => PublicKeyKind::Rsa,
            Ok(PublicKey::EC(_)) => match public_key.len() {
                P256_POINT_LEN => PublicKeyKind::EcP256,
                P384_POINT_LEN => PublicKeyKind::EcP384,
                len => {
                    return Err(CryptoError::UnsupportedAlgorithm(format!(
                        "EC point of {len} bytes"
                    )))
                }
            },
            Ok(_) => {
                return Err(CryptoError::UnsupportedAlgorithm(
                    "certificate key type".to_string(),
                ))
            }
            Err(e) => return Err(CryptoError::InvalidCertificate(e.to_string())),
        };

        Ok(Self {
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            not_before,
            not_after,
            key_kind,
            public_key,
        })
    }

    /// Parses a PEM-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM or the certificate inside is malformed.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        Self::from_der(&pem_to_der(pem)?)
    }

    /// Parses the base64 content of a `ds:X509Certificate` element.
    ///
    /// Whitespace inside the value is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the base64 or the certificate is malformed.
    pub fn from_base64(value: &str) -> CryptoResult<Self> {
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Self::from_der(&der)
    }

    /// Returns the certificate DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the DER as standard base64, as written into metadata.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Returns the subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the start of the validity window.
    #[must_use]
    pub const fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Returns the end of the validity window.
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns the kind of the subject public key.
    #[must_use]
    pub const fn key_kind(&self) -> PublicKeyKind {
        self.key_kind
    }

    /// Returns the raw subject public key bits.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Returns the hex SHA-256 fingerprint of the DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        sha256(&self.der)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Returns whether `now` lies inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Verifies `signature` over `data` with this certificate's key.
    ///
    /// # Errors
    ///
    /// Returns an error if `algorithm` cannot be used with the key.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> CryptoResult<bool> {
        let verification: &'static dyn VerificationAlgorithm = match (algorithm, self.key_kind) {
            (SignatureAlgorithm::EcdsaSha256, PublicKeyKind::EcP256) => &ECDSA_P256_SHA256_FIXED,
            (SignatureAlgorithm::EcdsaSha384, PublicKeyKind::EcP384) => &ECDSA_P384_SHA384_FIXED,
            (SignatureAlgorithm::RsaSha256, PublicKeyKind::Rsa) => &RSA_PKCS1_2048_8192_SHA256,
            (alg, kind) => {
                return Err(CryptoError::UnsupportedAlgorithm(format!(
                    "{alg:?} with {kind:?} key"
                )))
            }
        };

        let key = UnparsedPublicKey::new(verification, &self.public_key);
        Ok(key.verify(data, signature).is_ok())
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("key_kind", &self.key_kind)
            .finish_non_exhaustive()
    }
}

fn timestamp(secs: i64) -> CryptoResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
        CryptoError::InvalidCertificate(format!("validity timestamp {secs} out of range"))
    })
}

/// Decodes the first PEM block in `pem` to DER.
///
/// # Errors
///
/// Returns an error if no PEM block is present or its body is not base64.
pub fn pem_to_der(pem: &str) -> CryptoResult<Vec<u8>> {
    let mut inside = false;
    let mut body = String::new();
    for line in pem.lines().map(str::trim) {
        if line.starts_with("-----BEGIN ") {
            inside = true;
        } else if line.starts_with("-----END ") {
            if inside {
                return base64::engine::general_purpose::STANDARD
                    .decode(body)
                    .map_err(|e| CryptoError::InvalidKey(format!("PEM body: {e}")));
            }
        } else if inside {
            body.push_str(line);
        }
    }
    Err(CryptoError::InvalidKey("no PEM block found".to_string()))
}
