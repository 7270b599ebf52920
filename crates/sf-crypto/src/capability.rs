//! The crypto capability consumed by the federation engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::algorithm::SignatureAlgorithm;
use crate::certificate::Certificate;

/// Result type alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Error type for crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// The private key does not belong to the certificate.
    #[error("private key does not match certificate {0}")]
    KeyMismatch(String),

    /// Algorithm not supported.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),

    /// IO error while reading key material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::algorithm::AlgorithmError> for CryptoError {
    fn from(err: crate::algorithm::AlgorithmError) -> Self {
        Self::UnsupportedAlgorithm(err.to_string())
    }
}

/// Signing and verification as seen by an authority.
///
/// Implementations own the local private key. Verification never needs the
/// local key: it uses the certificate of whoever signed.
pub trait CryptoCapability: Send + Sync {
    /// Signs the given data with the local key.
    ///
    /// ## Errors
    ///
    /// Returns an error if signing fails.
    fn sign(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Verifies `signature` over `data` with the public key of `certificate`.
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature.
    ///
    /// ## Errors
    ///
    /// Returns an error if the algorithm does not fit the certificate's key.
    fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        certificate: &Certificate,
        algorithm: SignatureAlgorithm,
    ) -> CryptoResult<bool> {
        certificate.verify(algorithm, data, signature)
    }

    /// Returns whether `certificate` may be used at `now`.
    fn certificate_valid(&self, certificate: &Certificate, now: DateTime<Utc>) -> bool {
        certificate.is_valid_at(now)
    }

    /// Returns the certificate matching the local key.
    fn certificate(&self) -> &Certificate;

    /// Returns the certificate announced for the next key, if any.
    fn next_certificate(&self) -> Option<&Certificate> {
        None
    }

    /// Returns the signature algorithm of the local key.
    fn algorithm(&self) -> SignatureAlgorithm;
}
