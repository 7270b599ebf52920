//! Redis connection configuration.

use serde::{Deserialize, Serialize};
use sf_core::RelayStoreConfig;

/// Redis connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL, `redis://` or `rediss://`.
    pub url: String,
    /// Prefix for RelayState keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl RedisConfig {
    /// Creates a configuration for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }

    /// Takes the Redis settings out of a RelayState store selection.
    ///
    /// Returns `None` when the selection is not Redis.
    #[must_use]
    pub fn from_store_config(store: &RelayStoreConfig) -> Option<Self> {
        match store {
            RelayStoreConfig::Redis { url, key_prefix } => {
                Some(Self::new(url.clone()).key_prefix(key_prefix.clone()))
            }
            RelayStoreConfig::Memory => None,
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.connect_timeout_ms = timeout;
        self
    }

    /// Formats a key with the configured prefix.
    #[must_use]
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

fn default_key_prefix() -> String {
    "sf:relay:".to_string()
}

const fn default_connect_timeout() -> u64 {
    5000
}
