//! The authority: one SAML2 entity with its keys, roles and trusted partners.
//!
//! An [`Authority`] owns its roles. Roles hold an [`AuthorityHandle`], a
//! weak reference by ID, so dropping the authority invalidates them instead
//! of keeping it alive.

mod directory;

pub use directory::AuthorityDirectory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use sf_core::{Event, EventType, FederationConfig};
use sf_crypto::CryptoCapability;
use sf_saml::metadata::{EntityDescriptor, KeyDescriptor};
use sf_saml::signature::XmlSigner;
use uuid::Uuid;

use crate::error::{ConfigurationError, FederationResult, TrustError};
use crate::registry::{EntityRecord, EntityRegistry, HttpMetadataFetcher, MetadataFetcher};
use crate::roles::{Role, RoleDescriptor, RoleKind};
use crate::strategy::{FixedNameIdFormats, StrategyRegistry};

/// Timing settings taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoritySettings {
    /// How long published metadata stays valid.
    pub metadata_validity: Duration,
    /// Tolerated clock difference with partners.
    pub clock_skew: Duration,
    /// Lifetime of RelayState records and inbound requests.
    pub relay_state_ttl: Duration,
}

impl AuthoritySettings {
    fn from_config(config: &FederationConfig) -> Self {
        Self {
            metadata_validity: config.metadata_validity(),
            clock_skew: config.clock_skew(),
            relay_state_ttl: config.relay_state_ttl(),
        }
    }

    /// Returns the clock skew as a signed duration.
    #[must_use]
    pub fn skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.clock_skew).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// A signed metadata document as last published.
#[derive(Debug, Clone)]
pub struct PublishedMetadata {
    /// The signed XML document.
    pub document: String,
    /// The descriptor the document was generated from.
    pub descriptor: EntityDescriptor,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// End of validity.
    pub valid_until: DateTime<Utc>,
}

/// A non-owning reference from a role to its authority.
#[derive(Clone)]
pub struct AuthorityHandle {
    id: Uuid,
    inner: Weak<AuthorityInner>,
}

impl AuthorityHandle {
    /// Returns the authority ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the authority if it still exists.
    pub fn upgrade(&self) -> FederationResult<Authority> {
        self.inner
            .upgrade()
            .map(|inner| Authority { inner })
            .ok_or_else(|| ConfigurationError::AuthorityNotFound(self.id.to_string()).into())
    }
}

impl fmt::Debug for AuthorityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorityHandle")
            .field("id", &self.id)
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

struct AuthorityInner {
    id: Uuid,
    entity_id: String,
    base_url: String,
    crypto: Arc<dyn CryptoCapability>,
    registry: EntityRegistry,
    strategies: StrategyRegistry,
    settings: AuthoritySettings,
    roles: RwLock<BTreeMap<RoleKind, Arc<dyn Role>>>,
    metadata: RwLock<Option<Arc<PublishedMetadata>>>,
}

/// A SAML2 authority.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Authority {
    inner: Arc<AuthorityInner>,
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("id", &self.inner.id)
            .field("entity_id", &self.inner.entity_id)
            .field("roles", &self.role_kinds())
            .finish_non_exhaustive()
    }
}

/// Builds an [`Authority`].
pub struct AuthorityBuilder {
    config: FederationConfig,
    crypto: Arc<dyn CryptoCapability>,
    fetcher: Option<Arc<dyn MetadataFetcher>>,
    strategies: StrategyRegistry,
}

impl AuthorityBuilder {
    /// Starts a builder from configuration and the local key.
    #[must_use]
    pub fn new(config: FederationConfig, crypto: Arc<dyn CryptoCapability>) -> Self {
        Self {
            config,
            crypto,
            fetcher: None,
            strategies: StrategyRegistry::new(),
        }
    }

    /// Replaces the HTTP metadata fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replaces the strategy registry.
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    /// Validates the configuration and builds the authority.
    pub fn build(self) -> FederationResult<Authority> {
        let config = self.config;
        config.validate()?;

        if let Some(formats) = &config.authority.name_id_formats {
            self.strategies
                .set_name_id_formats(Arc::new(FixedNameIdFormats(formats.clone())));
        }
        self.strategies
            .set_default_relay_store(config.relay_state.store.store_name())?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                HttpMetadataFetcher::new(config.fetch_timeout())
                    .map_err(|e| ConfigurationError::Invalid(e.to_string()))?,
            ),
        };
        let entity_id = config.authority.entity_id.clone();
        let registry = EntityRegistry::new(
            fetcher,
            config.fetch_timeout(),
            config.trust.stale_entity_policy,
        )
        .with_owner(entity_id.clone());

        let inner = AuthorityInner {
            id: Uuid::new_v4(),
            base_url: config.base_url().to_string(),
            entity_id,
            crypto: self.crypto,
            registry,
            strategies: self.strategies,
            settings: AuthoritySettings::from_config(&config),
            roles: RwLock::new(BTreeMap::new()),
            metadata: RwLock::new(None),
        };
        tracing::info!(
            authority_id = %inner.id,
            entity_id = %inner.entity_id,
            "authority created"
        );
        Ok(Authority {
            inner: Arc::new(inner),
        })
    }
}

impl Authority {
    /// Creates an authority that fetches partner metadata over HTTP.
    pub fn new(config: FederationConfig, crypto: Arc<dyn CryptoCapability>) -> FederationResult<Self> {
        AuthorityBuilder::new(config, crypto).build()
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder(config: FederationConfig, crypto: Arc<dyn CryptoCapability>) -> AuthorityBuilder {
        AuthorityBuilder::new(config, crypto)
    }

    /// Returns the authority ID.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns a weak handle for roles.
    #[must_use]
    pub fn handle(&self) -> AuthorityHandle {
        AuthorityHandle {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.inner.entity_id
    }

    /// Returns the base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Returns the local crypto capability.
    #[must_use]
    pub fn crypto(&self) -> &dyn CryptoCapability {
        self.inner.crypto.as_ref()
    }

    /// Returns the entity registry.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    /// Returns the strategy registry.
    #[must_use]
    pub fn strategies(&self) -> &StrategyRegistry {
        &self.inner.strategies
    }

    /// Returns the timing settings.
    #[must_use]
    pub fn settings(&self) -> &AuthoritySettings {
        &self.inner.settings
    }

    /// Returns the kinds currently registered.
    #[must_use]
    pub fn role_kinds(&self) -> Vec<RoleKind> {
        self.inner.roles.read().keys().copied().collect()
    }

    /// Returns the role registered under `kind`.
    #[must_use]
    pub fn role(&self, kind: RoleKind) -> Option<Arc<dyn Role>> {
        self.inner.roles.read().get(&kind).cloned()
    }

    /// Registers `role` under every kind it implements.
    ///
    /// Either all kinds are taken or none is.
    pub fn register_role(&self, role: Arc<dyn Role>) -> FederationResult<()> {
        let handle = role.owning_authority();
        if handle.id() != self.inner.id || handle.upgrade().is_err() {
            return Err(ConfigurationError::AuthorityNotFound(handle.id().to_string()).into());
        }
        let mut roles = self.inner.roles.write();
        if let Some(taken) = role.kinds().iter().find(|k| roles.contains_key(k)) {
            return Err(ConfigurationError::AlreadyRegistered(taken.as_str()).into());
        }
        for kind in role.kinds() {
            roles.insert(*kind, Arc::clone(&role));
        }
        *self.inner.metadata.write() = None;
        drop(roles);

        let kinds: Vec<_> = role.kinds().iter().map(|k| k.as_str()).collect();
        tracing::info!(entity_id = %self.inner.entity_id, roles = ?kinds, "role registered");
        Event::builder(EventType::RoleRegistered)
            .authority(&self.inner.entity_id)
            .detail("kinds", kinds.join(","))
            .detail("url", role.url())
            .build()
            .emit();
        Ok(())
    }

    /// Removes the role registered under `kind`, with every kind it occupies.
    pub fn unregister_role(&self, kind: RoleKind) -> FederationResult<Arc<dyn Role>> {
        let mut roles = self.inner.roles.write();
        let role = roles
            .get(&kind)
            .cloned()
            .ok_or_else(|| ConfigurationError::Invalid(format!("no {kind} role is registered")))?;
        for k in role.kinds() {
            roles.remove(k);
        }
        *self.inner.metadata.write() = None;
        drop(roles);

        tracing::info!(entity_id = %self.inner.entity_id, role = %kind, "role unregistered");
        Event::builder(EventType::RoleUnregistered)
            .authority(&self.inner.entity_id)
            .detail("kind", kind.as_str())
            .build()
            .emit();
        Ok(role)
    }

    /// Fails while roles are still registered.
    pub fn ensure_removable(&self) -> FederationResult<()> {
        let roles = self.inner.roles.read();
        if roles.is_empty() {
            return Ok(());
        }
        Err(ConfigurationError::DependentRoles(
            roles.keys().map(|k| k.as_str().to_string()).collect(),
        )
        .into())
    }

    /// Returns the signed metadata document of this authority.
    pub fn publish_metadata(&self) -> FederationResult<Arc<PublishedMetadata>> {
        self.publish_metadata_at(Utc::now())
    }

    /// Like [`Authority::publish_metadata`] at an explicit time.
    ///
    /// The cached document is returned until a role is (un)registered or its
    /// `validUntil` passes.
    pub fn publish_metadata_at(&self, now: DateTime<Utc>) -> FederationResult<Arc<PublishedMetadata>> {
        if let Some(cached) = self.inner.metadata.read().as_ref() {
            if cached.valid_until > now {
                return Ok(Arc::clone(cached));
            }
        }

        let roles = self.inner.roles.read();
        if roles.is_empty() {
            return Err(ConfigurationError::NoRolesRegistered.into());
        }
        let validity = chrono::Duration::from_std(self.inner.settings.metadata_validity)
            .map_err(|e| ConfigurationError::Invalid(format!("metadata validity: {e}")))?;
        let valid_until = now + validity;
        // validUntil is written with second precision.
        let valid_until = valid_until.with_nanosecond(0).unwrap_or(valid_until);

        let crypto = self.crypto();
        let mut keys = vec![KeyDescriptor::signing(crypto.certificate().clone())];
        if let Some(next) = crypto.next_certificate() {
            keys.push(KeyDescriptor::signing(next.clone()));
        }

        let mut descriptor = EntityDescriptor::new(self.inner.entity_id.clone()).valid_until(valid_until);
        for role in roles.values() {
            match role.descriptor(&keys) {
                RoleDescriptor::Idp(idp) => descriptor.idp_sso = Some(idp),
                RoleDescriptor::Sp(sp) => descriptor.sp_sso = Some(sp),
            }
        }
        let document = descriptor
            .to_signed_document(&XmlSigner::new(crypto))
            .map_err(|e| ConfigurationError::Invalid(format!("cannot sign metadata: {e}")))?;

        self.inner
            .registry
            .upsert_protected(document.clone(), descriptor.clone(), now);
        let published = Arc::new(PublishedMetadata {
            document,
            descriptor,
            generated_at: now,
            valid_until,
        });
        *self.inner.metadata.write() = Some(Arc::clone(&published));
        drop(roles);

        tracing::debug!(entity_id = %self.inner.entity_id, valid_until = %valid_until, "metadata published");
        Ok(published)
    }

    /// Returns usable metadata for `entity_id`; see [`EntityRegistry::resolve`].
    ///
    /// The authority's own entity ID resolves to its published metadata.
    pub async fn resolve_entity(&self, entity_id: &str) -> FederationResult<Arc<EntityRecord>> {
        self.resolve_entity_at(entity_id, Utc::now()).await
    }

    /// Like [`Authority::resolve_entity`] at an explicit time.
    pub async fn resolve_entity_at(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> FederationResult<Arc<EntityRecord>> {
        if entity_id == self.inner.entity_id {
            return self.own_record(now);
        }
        self.inner.registry.resolve(entity_id, now).await
    }

    fn own_record(&self, now: DateTime<Utc>) -> FederationResult<Arc<EntityRecord>> {
        self.publish_metadata_at(now)?;
        self.inner
            .registry
            .get(&self.inner.entity_id)
            .ok_or_else(|| TrustError::UnknownEntity(self.inner.entity_id.clone()).into())
    }

    /// Adds or replaces a partner from its metadata document.
    pub fn upsert_entity(&self, document: &str) -> FederationResult<Arc<EntityRecord>> {
        self.inner.registry.upsert(document, Utc::now())
    }

    /// Removes a partner. The authority's own entity cannot be removed.
    pub fn remove_entity(&self, entity_id: &str) -> FederationResult<()> {
        self.inner.registry.remove(entity_id)
    }

    /// Refreshes a partner's metadata now.
    ///
    /// For the authority's own entity this regenerates the published document.
    pub async fn refresh_entity(&self, entity_id: &str) -> FederationResult<Arc<EntityRecord>> {
        let now = Utc::now();
        if entity_id == self.inner.entity_id {
            *self.inner.metadata.write() = None;
            return self.own_record(now);
        }
        self.inner.registry.refresh(entity_id, now).await
    }

    /// Records where a partner's metadata is fetched from.
    pub fn register_entity_source(&self, entity_id: &str, location: &str) {
        self.inner.registry.register_source(entity_id, location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::roles::{IdentityProviderRole, IdpSettings, ServiceProviderRole, SpSettings};
    use crate::test_support::{authority, sp_metadata};

    const ENTITY: &str = "https://idp.example.org";

    #[test]
    fn publishing_without_roles_fails() {
        let authority = authority(ENTITY);
        assert!(matches!(
            authority.publish_metadata(),
            Err(FederationError::Configuration(ConfigurationError::NoRolesRegistered))
        ));
    }

    #[test]
    fn metadata_is_cached_until_roles_change() {
        let authority = authority(ENTITY);
        let idp = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        authority.register_role(Arc::new(idp)).unwrap();

        let first = authority.publish_metadata().unwrap();
        let second = authority.publish_metadata().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.descriptor.idp_sso.is_some());
        assert!(first.descriptor.sp_sso.is_none());

        let sp = ServiceProviderRole::new(&authority, SpSettings::default(), Vec::new()).unwrap();
        authority.register_role(Arc::new(sp)).unwrap();
        let third = authority.publish_metadata().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.descriptor.sp_sso.is_some());
    }

    #[test]
    fn published_metadata_round_trips() {
        let authority = authority(ENTITY);
        let idp = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        authority.register_role(Arc::new(idp)).unwrap();

        let published = authority.publish_metadata().unwrap();
        let parsed = EntityDescriptor::parse(&published.document).unwrap();
        assert_eq!(parsed, published.descriptor);
        assert_eq!(
            parsed.idp_sso.unwrap().single_sign_on_services[0].location,
            "https://idp.example.org/idp/redirect"
        );
    }

    #[test]
    fn expired_cache_is_regenerated() {
        let authority = authority(ENTITY);
        let idp = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        authority.register_role(Arc::new(idp)).unwrap();

        let now = Utc::now();
        let first = authority.publish_metadata_at(now).unwrap();
        let later = first.valid_until + chrono::Duration::seconds(1);
        let second = authority.publish_metadata_at(later).unwrap();
        assert!(second.valid_until > first.valid_until);
    }

    #[test]
    fn second_role_of_a_kind_is_rejected() {
        let authority = authority(ENTITY);
        let first = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        let second = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        authority.register_role(Arc::new(first)).unwrap();
        assert!(matches!(
            authority.register_role(Arc::new(second)),
            Err(FederationError::Configuration(ConfigurationError::AlreadyRegistered(_)))
        ));
    }

    #[test]
    fn role_of_another_authority_is_rejected() {
        let mine = authority(ENTITY);
        let other = authority("https://other.example.org");
        let foreign = IdentityProviderRole::new(&other, IdpSettings::default()).unwrap();
        assert!(matches!(
            mine.register_role(Arc::new(foreign)),
            Err(FederationError::Configuration(ConfigurationError::AuthorityNotFound(_)))
        ));
    }

    #[test]
    fn dropped_authority_invalidates_handles() {
        let authority = authority(ENTITY);
        let handle = authority.handle();
        assert!(handle.upgrade().is_ok());
        drop(authority);
        assert!(handle.upgrade().is_err());
    }

    #[test]
    fn removal_requires_no_roles() {
        let authority = authority(ENTITY);
        let idp = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        authority.register_role(Arc::new(idp)).unwrap();
        assert!(matches!(
            authority.ensure_removable(),
            Err(FederationError::Configuration(ConfigurationError::DependentRoles(_)))
        ));
        authority.unregister_role(RoleKind::IdentityProvider).unwrap();
        authority.ensure_removable().unwrap();
    }

    #[tokio::test]
    async fn own_entity_is_protected() {
        let authority = authority(ENTITY);
        let idp = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        authority.register_role(Arc::new(idp)).unwrap();

        let own = authority.resolve_entity(ENTITY).await.unwrap();
        assert!(own.protected);
        assert!(matches!(
            authority.remove_entity(ENTITY),
            Err(FederationError::Configuration(ConfigurationError::ProtectedEntity(_)))
        ));
    }

    #[tokio::test]
    async fn partners_are_managed_by_hand() {
        let authority = authority(ENTITY);
        let document = sp_metadata("https://sp.example.org", None);
        authority.upsert_entity(&document).unwrap();
        assert!(authority.resolve_entity("https://sp.example.org").await.is_ok());

        authority.remove_entity("https://sp.example.org").unwrap();
        assert!(matches!(
            authority.resolve_entity("https://sp.example.org").await,
            Err(FederationError::Trust(TrustError::UnknownEntity(_)))
        ));
    }
}
