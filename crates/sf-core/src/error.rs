//! Error handling for configuration loading.
//!
//! Protocol and trust failures live in `sf-trust`; this type only covers
//! problems an operator fixes before the engine starts.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is absent.
    #[error("missing configuration value: {0}")]
    Missing(String),

    /// A setting is present but unusable.
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// IO error while reading configuration or key material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates an [`Error::Invalid`] for `key`.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
