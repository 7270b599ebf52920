//! Configuration for a federation authority.
//!
//! Configuration is loaded from `SF_*` environment variables (a `.env` file is
//! honoured) or from a TOML file. Every section has defaults except the
//! authority's entity ID and base URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Local authority settings.
    pub authority: AuthorityConfig,
    /// Trust evaluation settings.
    #[serde(default)]
    pub trust: TrustConfig,
    /// RelayState settings.
    #[serde(default)]
    pub relay_state: RelayStateConfig,
    /// Signing key material.
    #[serde(default)]
    pub crypto: CryptoConfig,
}

/// Local authority configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// The authority's entity ID (a URI).
    pub entity_id: String,
    /// Base URL under which role endpoints are published.
    pub base_url: String,
    /// Validity period of the published metadata, in seconds.
    #[serde(default = "default_metadata_validity")]
    pub metadata_validity_secs: u64,
    /// Overrides the NameID formats advertised by every role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_id_formats: Option<Vec<String>>,
}

/// Trust evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Tolerated clock difference when checking validity windows, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
    /// Upper bound for a single metadata fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// What to do with entities whose metadata expired and could not be refreshed.
    #[serde(default)]
    pub stale_entity_policy: StaleEntityPolicy,
}

/// Policy for entities past `validUntil` whose refresh failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StaleEntityPolicy {
    /// Never trust material past its literal `validUntil`.
    #[default]
    Reject,
    /// Keep trusting last-known-good material for a bounded time.
    GracePeriod {
        /// Length of the grace period in seconds.
        seconds: u64,
    },
}

impl StaleEntityPolicy {
    /// Returns the grace period granted past `validUntil`.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        match self {
            Self::Reject => Duration::ZERO,
            Self::GracePeriod { seconds } => Duration::from_secs(*seconds),
        }
    }
}

/// RelayState configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStateConfig {
    /// Lifetime of an unconsumed RelayState record, in seconds.
    #[serde(default = "default_relay_state_ttl")]
    pub ttl_secs: u64,
    /// Backing store.
    #[serde(default)]
    pub store: RelayStoreConfig,
}

/// RelayState store selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayStoreConfig {
    /// Process-local store.
    #[default]
    Memory,
    /// Redis-backed store shared between instances.
    Redis {
        /// Redis connection URL.
        url: String,
        /// Prefix for RelayState keys.
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
}

impl RelayStoreConfig {
    /// Returns the capability name used to select the store.
    #[must_use]
    pub const fn store_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis { .. } => "redis",
        }
    }
}

/// Signing key configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// PKCS#8 private key (PEM or DER).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    /// X.509 certificate matching the private key (PEM or DER).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<PathBuf>,
    /// Certificate announced ahead of a key rollover.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_certificate_path: Option<PathBuf>,
}

fn default_metadata_validity() -> u64 {
    86_400
}

fn default_clock_skew() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_relay_state_ttl() -> u64 {
    300
}

fn default_key_prefix() -> String {
    "sf:relay:".to_string()
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: default_clock_skew(),
            fetch_timeout_secs: default_fetch_timeout(),
            stale_entity_policy: StaleEntityPolicy::default(),
        }
    }
}

impl Default for RelayStateConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_relay_state_ttl(),
            store: RelayStoreConfig::default(),
        }
    }
}

impl FederationConfig {
    /// Creates a configuration with defaults for everything but identity.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            authority: AuthorityConfig {
                entity_id: entity_id.into(),
                base_url: base_url.into(),
                metadata_validity_secs: default_metadata_validity(),
                name_id_formats: None,
            },
            trust: TrustConfig::default(),
            relay_state: RelayStateConfig::default(),
            crypto: CryptoConfig::default(),
        }
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let entity_id =
            lookup("SF_ENTITY_ID").ok_or_else(|| Error::Missing("SF_ENTITY_ID".to_string()))?;
        let base_url =
            lookup("SF_BASE_URL").ok_or_else(|| Error::Missing("SF_BASE_URL".to_string()))?;

        let mut config = Self::new(entity_id, base_url);

        if let Some(v) = parse_u64(&lookup, "SF_METADATA_VALIDITY")? {
            config.authority.metadata_validity_secs = v;
        }
        config.authority.name_id_formats = lookup("SF_NAMEID_FORMATS").map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect()
        });

        if let Some(v) = parse_u64(&lookup, "SF_CLOCK_SKEW")? {
            config.trust.clock_skew_secs = v;
        }
        if let Some(v) = parse_u64(&lookup, "SF_FETCH_TIMEOUT")? {
            config.trust.fetch_timeout_secs = v;
        }
        if let Some(seconds) = parse_u64(&lookup, "SF_STALE_GRACE")? {
            config.trust.stale_entity_policy = StaleEntityPolicy::GracePeriod { seconds };
        }

        if let Some(v) = parse_u64(&lookup, "SF_RELAY_STATE_TTL")? {
            config.relay_state.ttl_secs = v;
        }
        config.relay_state.store = match lookup("SF_RELAY_STORE").as_deref() {
            None | Some("memory") => RelayStoreConfig::Memory,
            Some("redis") => RelayStoreConfig::Redis {
                url: lookup("REDIS_URL")
                    .ok_or_else(|| Error::Missing("REDIS_URL".to_string()))?,
                key_prefix: lookup("SF_REDIS_KEY_PREFIX").unwrap_or_else(default_key_prefix),
            },
            Some(other) => {
                return Err(Error::invalid(
                    "SF_RELAY_STORE",
                    format!("unknown store '{other}'"),
                ))
            }
        };

        config.crypto.private_key_path = lookup("SF_SIGNING_KEY").map(PathBuf::from);
        config.crypto.certificate_path = lookup("SF_SIGNING_CERT").map(PathBuf::from);
        config.crypto.next_certificate_path = lookup("SF_NEXT_SIGNING_CERT").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.authority.entity_id.trim().is_empty() {
            return Err(Error::invalid("entity_id", "must not be empty"));
        }
        let base = url::Url::parse(&self.authority.base_url)
            .map_err(|e| Error::invalid("base_url", e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(Error::invalid("base_url", "must be an absolute URL"));
        }
        if self.authority.metadata_validity_secs == 0 {
            return Err(Error::invalid("metadata_validity_secs", "must be positive"));
        }
        if self.relay_state.ttl_secs == 0 {
            return Err(Error::invalid("relay_state.ttl_secs", "must be positive"));
        }
        if self.trust.fetch_timeout_secs == 0 {
            return Err(Error::invalid("trust.fetch_timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.authority.base_url.trim_end_matches('/')
    }

    /// Metadata validity as a duration.
    #[must_use]
    pub const fn metadata_validity(&self) -> Duration {
        Duration::from_secs(self.authority.metadata_validity_secs)
    }

    /// Clock skew tolerance as a duration.
    #[must_use]
    pub const fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.trust.clock_skew_secs)
    }

    /// Metadata fetch timeout as a duration.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.trust.fetch_timeout_secs)
    }

    /// RelayState lifetime as a duration.
    #[must_use]
    pub const fn relay_state_ttl(&self) -> Duration {
        Duration::from_secs(self.relay_state.ttl_secs)
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| Error::invalid(key, e.to_string()))
        })
        .transpose()
}
