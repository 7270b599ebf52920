//! CLI error types.

use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] sf_core::Error),

    /// Key material could not be loaded.
    #[error("crypto error: {0}")]
    Crypto(#[from] sf_crypto::CryptoError),

    /// A SAML document or message could not be decoded.
    #[error("SAML error: {0}")]
    Saml(#[from] sf_saml::SamlError),

    /// The federation engine refused an operation.
    #[error(transparent)]
    Federation(#[from] sf_trust::FederationError),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sf_trust::RelayStateError> for CliError {
    fn from(err: sf_trust::RelayStateError) -> Self {
        Self::Federation(err.into())
    }
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;
