//! Strategy registry.
//!
//! Pluggable behaviour is looked up by capability when a role is built and
//! frozen into a [`StrategySet`]. Later registrations do not affect roles
//! that already exist.

use std::fmt::Debug;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use sf_saml::types::NameIdFormat;

use crate::error::ConfigurationError;
use crate::relay_state::{MemoryRelayStateStore, RelayStateStore};
use crate::roles::RoleKind;

/// Name of the built-in RelayState store.
pub const MEMORY_RELAY_STORE: &str = "memory";

/// Kinds of pluggable behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Name ID formats a role supports.
    NameIdFormats,
    /// Role URL construction.
    UrlCustomization,
    /// RelayState storage.
    RelayStateStore,
}

impl Capability {
    /// Returns the capability name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NameIdFormats => "name_id_formats",
            Self::UrlCustomization => "url_customization",
            Self::RelayStateStore => "relay_state_store",
        }
    }
}

/// Supplies the name ID formats of a role.
pub trait NameIdFormatSupport: Send + Sync + Debug {
    /// Returns the format URIs for `kind`, most preferred first.
    fn formats(&self, kind: RoleKind) -> Vec<String>;
}

/// Formats used when nothing else is registered.
///
/// IdPs offer persistent, transient and unspecified; SPs persistent and
/// unspecified.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNameIdFormats;

impl NameIdFormatSupport for DefaultNameIdFormats {
    fn formats(&self, kind: RoleKind) -> Vec<String> {
        let formats: &[NameIdFormat] = match kind {
            RoleKind::IdentityProvider | RoleKind::AttributeProvider => &[
                NameIdFormat::Persistent,
                NameIdFormat::Transient,
                NameIdFormat::Unspecified,
            ],
            RoleKind::ServiceProvider => &[NameIdFormat::Persistent, NameIdFormat::Unspecified],
        };
        formats.iter().map(|f| f.uri().to_string()).collect()
    }
}

/// The same formats for every role, typically from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedNameIdFormats(pub Vec<String>);

impl NameIdFormatSupport for FixedNameIdFormats {
    fn formats(&self, _kind: RoleKind) -> Vec<String> {
        self.0.clone()
    }
}

/// Overrides where a role is reachable.
pub trait UrlCustomizer: Send + Sync + Debug {
    /// Returns the role URL, or `None` to use `{base_url}/{path}`.
    fn role_url(&self, base_url: &str, kind: RoleKind) -> Option<String>;
}

/// Strategies resolved for one role.
#[derive(Debug, Clone)]
pub struct StrategySet {
    /// Name ID formats, most preferred first.
    pub name_id_formats: Vec<String>,
    /// URL customizer, if one was registered.
    pub url_customizer: Option<Arc<dyn UrlCustomizer>>,
    /// RelayState store.
    pub relay_store: Arc<dyn RelayStateStore>,
}

impl StrategySet {
    /// Computes the URL of a role of `kind`.
    #[must_use]
    pub fn role_url(&self, base_url: &str, kind: RoleKind) -> String {
        self.url_customizer
            .as_ref()
            .and_then(|c| c.role_url(base_url, kind))
            .unwrap_or_else(|| format!("{}/{}", base_url.trim_end_matches('/'), kind.path()))
    }
}

/// Registry of strategies keyed by capability.
#[derive(Debug)]
pub struct StrategyRegistry {
    relay_stores: DashMap<String, Arc<dyn RelayStateStore>>,
    default_relay_store: RwLock<String>,
    name_id_formats: RwLock<Option<Arc<dyn NameIdFormatSupport>>>,
    url_customizer: RwLock<Option<Arc<dyn UrlCustomizer>>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let relay_stores: DashMap<String, Arc<dyn RelayStateStore>> = DashMap::new();
        relay_stores.insert(
            MEMORY_RELAY_STORE.to_string(),
            Arc::new(MemoryRelayStateStore::new()),
        );
        Self {
            relay_stores,
            default_relay_store: RwLock::new(MEMORY_RELAY_STORE.to_string()),
            name_id_formats: RwLock::new(None),
            url_customizer: RwLock::new(None),
        }
    }
}

impl StrategyRegistry {
    /// Creates a registry with the in-memory RelayState store as default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a RelayState store under `name`.
    pub fn register_relay_store(&self, name: impl Into<String>, store: Arc<dyn RelayStateStore>) {
        let name = name.into();
        tracing::debug!(store = %name, "relay state store registered");
        self.relay_stores.insert(name, store);
    }

    /// Selects the RelayState store roles get.
    pub fn set_default_relay_store(&self, name: &str) -> Result<(), ConfigurationError> {
        if !self.relay_stores.contains_key(name) {
            return Err(ConfigurationError::Invalid(format!(
                "relay state store '{name}' is not registered"
            )));
        }
        *self.default_relay_store.write() = name.to_string();
        Ok(())
    }

    /// Returns the name of the selected RelayState store.
    #[must_use]
    pub fn default_relay_store(&self) -> String {
        self.default_relay_store.read().clone()
    }

    /// Replaces the name ID format source.
    pub fn set_name_id_formats(&self, formats: Arc<dyn NameIdFormatSupport>) {
        *self.name_id_formats.write() = Some(formats);
    }

    /// Replaces the URL customizer.
    pub fn set_url_customizer(&self, customizer: Arc<dyn UrlCustomizer>) {
        *self.url_customizer.write() = Some(customizer);
    }

    /// Returns whether something was registered for `capability`.
    ///
    /// The RelayState store always is.
    #[must_use]
    pub fn is_registered(&self, capability: Capability) -> bool {
        match capability {
            Capability::NameIdFormats => self.name_id_formats.read().is_some(),
            Capability::UrlCustomization => self.url_customizer.read().is_some(),
            Capability::RelayStateStore => !self.relay_stores.is_empty(),
        }
    }

    /// Lists the registered RelayState stores.
    #[must_use]
    pub fn relay_store_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.relay_stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Resolves the strategies for a role of `kind`.
    pub fn resolve(&self, kind: RoleKind) -> Result<StrategySet, ConfigurationError> {
        let formats = self
            .name_id_formats
            .read()
            .as_ref()
            .map_or_else(|| DefaultNameIdFormats.formats(kind), |f| f.formats(kind));
        if formats.is_empty() {
            return Err(ConfigurationError::Invalid(format!(
                "no name ID formats for the {} role",
                kind.as_str()
            )));
        }
        let store_name = self.default_relay_store();
        let relay_store = self
            .relay_stores
            .get(&store_name)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| {
                ConfigurationError::Invalid(format!("relay state store '{store_name}' is not registered"))
            })?;
        Ok(StrategySet {
            name_id_formats: formats,
            url_customizer: self.url_customizer.read().clone(),
            relay_store,
        })
    }
}
