//! SAML error types.
//!
//! Provides error types for XML handling, message codecs, signatures and
//! bindings.

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// An element or attribute has an unusable value.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The root element is not the expected message.
    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// The expected element name.
        expected: &'static str,
        /// The element name found.
        actual: String,
    },

    /// Metadata document is structurally unusable.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// XML signature validation failed.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// Unknown or unsupported binding.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Invalid binding parameters.
    #[error("invalid binding message: {0}")]
    InvalidBinding(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl SamlError {
    /// Returns whether the error means a signature did not check out.
    #[must_use]
    pub const fn is_signature_failure(&self) -> bool {
        matches!(self, Self::SignatureInvalid(_))
    }

    /// Returns the SAML status code an IdP reports for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::UnsupportedBinding(_) => "urn:oasis:names:tc:SAML:2.0:status:RequestUnsupported",
            Self::SignatureCreation(_) | Self::Crypto(_) => {
                "urn:oasis:names:tc:SAML:2.0:status:Responder"
            }
            _ => "urn:oasis:names:tc:SAML:2.0:status:Requester",
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Deflate(err.to_string())
    }
}

impl From<sf_crypto::CryptoError> for SamlError {
    fn from(err: sf_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}
