//! Entity registry.
//!
//! The registry holds the metadata of every partner an authority trusts.
//! Records are replaced wholesale, never mutated in place, so a reader
//! holding an `Arc<EntityRecord>` always sees a consistent document.
//!
//! Refresh is lazy: [`EntityRegistry::resolve`] fetches fresh metadata only
//! once the cached copy passed its `validUntil`. Concurrent resolutions of
//! the same entity share one fetch.

mod fetcher;

pub use fetcher::{FetchError, HttpMetadataFetcher, MetadataFetcher, NoFetch};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sf_core::{Event, EventType, StaleEntityPolicy};
use sf_crypto::Certificate;
use sf_saml::metadata::EntityDescriptor;

use crate::error::{ConfigurationError, FederationResult, TrustError};

/// A registered entity.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    /// The entity ID.
    pub entity_id: String,
    /// The metadata document as received.
    pub document: String,
    /// The parsed metadata.
    pub descriptor: EntityDescriptor,
    /// When the metadata stops being valid.
    pub valid_until: Option<DateTime<Utc>>,
    /// When the metadata was last stored.
    pub refreshed_at: DateTime<Utc>,
    /// Whether the last refresh failed.
    pub stale: bool,
    /// Where the metadata is fetched from.
    pub source: Option<String>,
    /// Whether this is the owning authority itself.
    pub protected: bool,
}

impl EntityRecord {
    fn new(
        document: String,
        descriptor: EntityDescriptor,
        now: DateTime<Utc>,
        source: Option<String>,
        protected: bool,
    ) -> Self {
        Self {
            entity_id: descriptor.entity_id.clone(),
            valid_until: descriptor.valid_until,
            document,
            descriptor,
            refreshed_at: now,
            stale: false,
            source,
            protected,
        }
    }

    /// Returns whether the metadata passed its `validUntil` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| until <= now)
    }

    /// Returns the signing certificates of every role.
    #[must_use]
    pub fn signing_certificates(&self) -> Vec<Certificate> {
        self.descriptor.signing_certificates()
    }

    fn marked_stale(&self) -> Self {
        Self {
            stale: true,
            ..self.clone()
        }
    }
}

/// Partner metadata, keyed by entity ID.
#[derive(Debug)]
pub struct EntityRegistry {
    entities: DashMap<String, Arc<EntityRecord>>,
    sources: DashMap<String, String>,
    refresh_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    fetcher: Arc<dyn MetadataFetcher>,
    fetch_timeout: Duration,
    stale_policy: StaleEntityPolicy,
    owner: Option<String>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn MetadataFetcher>,
        fetch_timeout: Duration,
        stale_policy: StaleEntityPolicy,
    ) -> Self {
        Self {
            entities: DashMap::new(),
            sources: DashMap::new(),
            refresh_locks: DashMap::new(),
            fetcher,
            fetch_timeout,
            stale_policy,
            owner: None,
        }
    }

    /// Reserves `entity_id` for the owning authority.
    ///
    /// The owner's entity cannot be upserted, removed or fetched through the
    /// public operations.
    #[must_use]
    pub fn with_owner(mut self, entity_id: impl Into<String>) -> Self {
        self.owner = Some(entity_id.into());
        self
    }

    /// Returns the stale-entity policy.
    #[must_use]
    pub const fn stale_policy(&self) -> StaleEntityPolicy {
        self.stale_policy
    }

    /// Adds or replaces an entity from its metadata document.
    pub fn upsert(&self, document: &str, now: DateTime<Utc>) -> FederationResult<Arc<EntityRecord>> {
        let descriptor = EntityDescriptor::parse(document)
            .map_err(|e| TrustError::InvalidMetadata(e.to_string()))?;
        if self.is_protected(&descriptor.entity_id) {
            return Err(ConfigurationError::ProtectedEntity(descriptor.entity_id).into());
        }
        let record = self.store(document.to_string(), descriptor, now, false);
        Event::builder(EventType::EntityUpserted)
            .peer(&record.entity_id)
            .build()
            .emit();
        Ok(record)
    }

    /// Stores the owning authority's own metadata.
    pub(crate) fn upsert_protected(
        &self,
        document: String,
        descriptor: EntityDescriptor,
        now: DateTime<Utc>,
    ) -> Arc<EntityRecord> {
        self.store(document, descriptor, now, true)
    }

    fn store(
        &self,
        document: String,
        descriptor: EntityDescriptor,
        now: DateTime<Utc>,
        protected: bool,
    ) -> Arc<EntityRecord> {
        let source = self
            .sources
            .get(&descriptor.entity_id)
            .map(|s| s.value().clone());
        let record = Arc::new(EntityRecord::new(document, descriptor, now, source, protected));
        self.entities
            .insert(record.entity_id.clone(), Arc::clone(&record));
        record
    }

    fn is_protected(&self, entity_id: &str) -> bool {
        self.owner.as_deref() == Some(entity_id)
    }

    /// Removes an entity.
    pub fn remove(&self, entity_id: &str) -> FederationResult<()> {
        if self.is_protected(entity_id) {
            return Err(ConfigurationError::ProtectedEntity(entity_id.to_string()).into());
        }
        self.entities
            .remove(entity_id)
            .ok_or_else(|| TrustError::UnknownEntity(entity_id.to_string()))?;
        self.refresh_locks.remove(entity_id);
        Event::builder(EventType::EntityRemoved)
            .peer(entity_id)
            .build()
            .emit();
        Ok(())
    }

    /// Records where an entity's metadata is fetched from.
    pub fn register_source(&self, entity_id: &str, location: &str) {
        self.sources
            .insert(entity_id.to_string(), location.to_string());
        if let Some(mut record) = self.entities.get_mut(entity_id) {
            let mut updated = EntityRecord::clone(&record);
            updated.source = Some(location.to_string());
            *record = Arc::new(updated);
        }
    }

    /// Returns the cached record without refreshing it.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityRecord>> {
        self.entities.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    /// Returns every registered entity ID, sorted.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns whether no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns usable metadata for `entity_id`, refreshing it when expired.
    ///
    /// An unknown entity is fetched when a source was registered for it; if
    /// that first fetch fails the entity stays unknown. When an expired entity cannot be refreshed the stale-entity policy
    /// decides whether the last known copy is still returned.
    pub async fn resolve(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> FederationResult<Arc<EntityRecord>> {
        if self.is_protected(entity_id) {
            return self
                .get(entity_id)
                .ok_or_else(|| TrustError::UnknownEntity(entity_id.to_string()).into());
        }
        match self.get(entity_id) {
            Some(record) if !record.is_expired_at(now) => return Ok(record),
            None if !self.sources.contains_key(entity_id) => {
                return Err(TrustError::UnknownEntity(entity_id.to_string()).into());
            }
            _ => {}
        }

        let lock = self.refresh_lock(entity_id);
        let _guard = lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(record) = self.get(entity_id) {
            if !record.is_expired_at(now) {
                return Ok(record);
            }
        }
        match self.fetch_and_store(entity_id, now).await {
            Ok(record) => Ok(record),
            Err(reason) => self.fall_back(entity_id, now, reason),
        }
    }

    /// Fetches fresh metadata for `entity_id` regardless of its expiry.
    ///
    /// Uses the registered source, or the entity ID itself as URL. On
    /// failure the previous copy is kept and flagged stale.
    pub async fn refresh(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> FederationResult<Arc<EntityRecord>> {
        if self.is_protected(entity_id) {
            return Err(ConfigurationError::ProtectedEntity(entity_id.to_string()).into());
        }
        let lock = self.refresh_lock(entity_id);
        let _guard = lock.lock().await;
        match self.fetch_and_store(entity_id, now).await {
            Ok(record) => Ok(record),
            Err(reason) => {
                self.mark_stale(entity_id, &reason);
                Err(TrustError::MetadataUnavailable {
                    entity_id: entity_id.to_string(),
                    reason,
                }
                .into())
            }
        }
    }

    fn refresh_lock(&self, entity_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.refresh_locks
                .entry(entity_id.to_string())
                .or_default()
                .value(),
        )
    }

    fn location(&self, entity_id: &str) -> String {
        self.sources
            .get(entity_id)
            .map_or_else(|| entity_id.to_string(), |s| s.value().clone())
    }

    async fn fetch_and_store(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<EntityRecord>, String> {
        let location = self.location(entity_id);
        let bytes = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&location))
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout).to_string())?
            .map_err(|e| e.to_string())?;
        let document = String::from_utf8(bytes).map_err(|e| format!("not UTF-8: {e}"))?;
        let descriptor = EntityDescriptor::parse(&document).map_err(|e| e.to_string())?;
        if descriptor.entity_id != entity_id {
            return Err(format!(
                "document at {location} describes {}",
                descriptor.entity_id
            ));
        }
        if descriptor.is_expired_at(now) {
            return Err(format!("document at {location} is already expired"));
        }
        let record = self.store(document, descriptor, now, false);
        tracing::info!(entity_id = %entity_id, location = %location, "metadata refreshed");
        Event::builder(EventType::EntityRefreshed)
            .peer(entity_id)
            .detail("location", location)
            .build()
            .emit();
        Ok(record)
    }

    fn mark_stale(&self, entity_id: &str, reason: &str) -> Option<Arc<EntityRecord>> {
        tracing::warn!(entity_id = %entity_id, error = %reason, "metadata refresh failed");
        Event::builder(EventType::EntityRefreshFailed)
            .peer(entity_id)
            .failure(reason)
            .build()
            .emit();
        let mut entry = self.entities.get_mut(entity_id)?;
        let stale = Arc::new(entry.marked_stale());
        *entry = Arc::clone(&stale);
        Some(stale)
    }

    fn fall_back(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
        reason: String,
    ) -> FederationResult<Arc<EntityRecord>> {
        let Some(record) = self.mark_stale(entity_id, &reason) else {
            tracing::debug!(entity_id = %entity_id, error = %reason, "no cached copy to fall back on");
            return Err(TrustError::UnknownEntity(entity_id.to_string()).into());
        };
        let grace = chrono::Duration::from_std(self.stale_policy.grace()).unwrap_or_default();
        match record.valid_until {
            Some(until) if now < until + grace => {
                tracing::warn!(entity_id = %entity_id, "using stale metadata within grace period");
                Ok(record)
            }
            _ => Err(TrustError::ExpiredMetadata(entity_id.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::test_support::{idp_metadata, StaticFetcher};

    const IDP: &str = "https://idp.example.org";

    fn registry(fetcher: StaticFetcher, policy: StaleEntityPolicy) -> EntityRegistry {
        EntityRegistry::new(Arc::new(fetcher), Duration::from_secs(1), policy)
    }

    fn owned_registry() -> EntityRegistry {
        registry(StaticFetcher::default(), StaleEntityPolicy::Reject).with_owner(IDP)
    }

    #[test]
    fn upsert_rejects_malformed_documents() {
        let registry = registry(StaticFetcher::default(), StaleEntityPolicy::Reject);
        let result = registry.upsert("<md:EntityDescriptor", Utc::now());
        assert!(matches!(
            result,
            Err(FederationError::Trust(TrustError::InvalidMetadata(_)))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unknown_entity_without_source() {
        let registry = registry(StaticFetcher::default(), StaleEntityPolicy::Reject);
        let result = registry.resolve(IDP, Utc::now()).await;
        assert!(matches!(
            result,
            Err(FederationError::Trust(TrustError::UnknownEntity(_)))
        ));
    }

    #[tokio::test]
    async fn valid_entity_is_not_refetched() {
        let now = Utc::now();
        let fetcher = StaticFetcher::default();
        let registry = registry(fetcher.clone(), StaleEntityPolicy::Reject);
        registry
            .upsert(&idp_metadata(IDP, now + chrono::Duration::hours(1)), now)
            .unwrap();

        let record = registry.resolve(IDP, now).await.unwrap();
        assert_eq!(record.entity_id, IDP);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn expired_entity_is_refreshed_from_source() {
        let now = Utc::now();
        let fetcher = StaticFetcher::default();
        fetcher.serve(
            "https://mdq.example.org/idp",
            idp_metadata(IDP, now + chrono::Duration::hours(2)),
        );
        let registry = registry(fetcher.clone(), StaleEntityPolicy::Reject);
        registry
            .upsert(&idp_metadata(IDP, now + chrono::Duration::minutes(5)), now)
            .unwrap();
        registry.register_source(IDP, "https://mdq.example.org/idp");

        let later = now + chrono::Duration::minutes(10);
        let record = registry.resolve(IDP, later).await.unwrap();
        assert!(!record.stale);
        assert_eq!(record.refreshed_at, later);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_rejects_by_default() {
        let now = Utc::now();
        let registry = registry(StaticFetcher::default(), StaleEntityPolicy::Reject);
        registry
            .upsert(&idp_metadata(IDP, now + chrono::Duration::minutes(5)), now)
            .unwrap();

        let later = now + chrono::Duration::minutes(10);
        let result = registry.resolve(IDP, later).await;
        assert!(matches!(
            result,
            Err(FederationError::Trust(TrustError::ExpiredMetadata(_)))
        ));
        assert!(registry.get(IDP).unwrap().stale);
    }

    #[tokio::test]
    async fn grace_period_keeps_stale_copy() {
        let now = Utc::now();
        let registry = registry(
            StaticFetcher::default(),
            StaleEntityPolicy::GracePeriod { seconds: 3600 },
        );
        registry
            .upsert(&idp_metadata(IDP, now + chrono::Duration::minutes(5)), now)
            .unwrap();

        let record = registry
            .resolve(IDP, now + chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert!(record.stale);

        let result = registry.resolve(IDP, now + chrono::Duration::hours(2)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_fetch() {
        let now = Utc::now();
        let fetcher = StaticFetcher::default();
        fetcher.serve(IDP, idp_metadata(IDP, now + chrono::Duration::hours(2)));
        let registry = Arc::new(registry(fetcher.clone(), StaleEntityPolicy::Reject));
        registry.register_source(IDP, IDP);

        let tasks = (0..8).map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.resolve(IDP, now).await.is_ok() })
        });
        let results = futures::future::join_all(tasks).await;
        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn fetched_document_must_describe_the_entity() {
        let now = Utc::now();
        let fetcher = StaticFetcher::default();
        fetcher.serve(
            IDP,
            idp_metadata("https://other.example.org", now + chrono::Duration::hours(2)),
        );
        let registry = registry(fetcher, StaleEntityPolicy::Reject);
        let result = registry.refresh(IDP, now).await;
        assert!(matches!(
            result,
            Err(FederationError::Trust(TrustError::MetadataUnavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn failed_first_fetch_leaves_the_entity_unknown() {
        let registry = registry(StaticFetcher::default(), StaleEntityPolicy::Reject);
        registry.register_source(IDP, "https://mdq.example.org/idp");

        let result = registry.resolve(IDP, Utc::now()).await;
        assert!(matches!(
            result,
            Err(FederationError::Trust(TrustError::UnknownEntity(ref id))) if id == IDP
        ));
        assert!(registry.get(IDP).is_none());

        assert!(matches!(
            registry.refresh(IDP, Utc::now()).await,
            Err(FederationError::Trust(TrustError::MetadataUnavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn protected_entity_cannot_be_removed_or_replaced() {
        let now = Utc::now();
        let registry = owned_registry();
        let document = idp_metadata(IDP, now + chrono::Duration::hours(1));
        let descriptor = EntityDescriptor::parse(&document).unwrap();
        registry.upsert_protected(document.clone(), descriptor, now);

        assert!(matches!(
            registry.remove(IDP),
            Err(FederationError::Configuration(ConfigurationError::ProtectedEntity(_)))
        ));
        assert!(registry.upsert(&document, now).is_err());
        assert!(registry.refresh(IDP, now).await.is_err());
    }

    #[test]
    fn remove_unknown_entity() {
        let registry = registry(StaticFetcher::default(), StaleEntityPolicy::Reject);
        assert!(matches!(
            registry.remove(IDP),
            Err(FederationError::Trust(TrustError::UnknownEntity(_)))
        ));
    }
}
