//! Signature and digest algorithm identifiers.
//!
//! XML-DSig and the HTTP-Redirect binding name algorithms by URI. The
//! enums here map between those URIs and the aws-lc-rs primitives.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for algorithm lookups.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// The URI does not name a supported algorithm.
    #[error("unsupported algorithm: {0}")]
    Unsupported(String),
}

/// Digest algorithms usable in XML-DSig references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256.
    #[serde(rename = "SHA256")]
    Sha256,

    /// SHA-384.
    #[serde(rename = "SHA384")]
    Sha384,

    /// SHA-512.
    #[serde(rename = "SHA512")]
    Sha512,
}

impl DigestAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the XML-DSig digest method URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses an XML-DSig digest method URI.
    pub fn from_uri(uri: &str) -> Result<Self, AlgorithmError> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#sha256" => Ok(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Ok(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Ok(Self::Sha512),
            _ => Err(AlgorithmError::Unsupported(uri.to_string())),
        }
    }
}

/// Signature algorithms usable in XML-DSig and the Redirect binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// ECDSA using P-256 and SHA-256.
    #[serde(rename = "ES256")]
    EcdsaSha256,

    /// ECDSA using P-384 and SHA-384.
    #[serde(rename = "ES384")]
    EcdsaSha384,

    /// RSA PKCS#1 v1.5 with SHA-256.
    #[serde(rename = "RS256")]
    RsaSha256,
}

impl SignatureAlgorithm {
    /// Returns the XML-DSig signature method URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::EcdsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256",
            Self::EcdsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
        }
    }

    /// Parses an XML-DSig signature method URI.
    pub fn from_uri(uri: &str) -> Result<Self, AlgorithmError> {
        match uri {
            "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256" => Ok(Self::EcdsaSha256),
            "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384" => Ok(Self::EcdsaSha384),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Ok(Self::RsaSha256),
            _ => Err(AlgorithmError::Unsupported(uri.to_string())),
        }
    }

    /// Returns the digest paired with this signature method.
    #[must_use]
    pub const fn digest(self) -> DigestAlgorithm {
        match self {
            Self::EcdsaSha256 | Self::RsaSha256 => DigestAlgorithm::Sha256,
            Self::EcdsaSha384 => DigestAlgorithm::Sha384,
        }
    }

    /// Returns whether this is an ECDSA algorithm.
    #[must_use]
    pub const fn is_ecdsa(self) -> bool {
        matches!(self, Self::EcdsaSha256 | Self::EcdsaSha384)
    }

    /// Returns whether this is an RSA algorithm.
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        matches!(self, Self::RsaSha256)
    }
}
