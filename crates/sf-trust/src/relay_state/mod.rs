//! RelayState records for SP-initiated logins.
//!
//! A record is created when an AuthnRequest leaves and is consumed when the
//! matching Response arrives. The lifecycle is
//!
//! ```text
//! Created ──consume──▶ Consumed
//!    │
//!    └────ttl──────▶ Expired
//! ```
//!
//! and nothing else: a consumed or expired record never comes back. The
//! token is the only thing that travels; everything else stays in the
//! [`RelayStateStore`].

mod memory;

pub use memory::MemoryRelayStateStore;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayStateError;

/// Result type for RelayState operations.
pub type RelayStateResult<T> = Result<T, RelayStateError>;

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStateStatus {
    /// Issued and waiting for its response.
    Created,
    /// Matched by a response; terminal.
    Consumed,
    /// Outlived its TTL; terminal.
    Expired,
}

/// State kept between an outgoing AuthnRequest and its Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStateRecord {
    /// Opaque token sent as `RelayState`.
    pub token: String,
    /// ID of the AuthnRequest.
    pub request_id: String,
    /// Where to send the user after login.
    pub relay_target: String,
    /// Entity ID of the IdP the request was addressed to.
    pub issuer_entity_id: String,
    /// Attribute consuming service index sent with the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_service_index: Option<u16>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: RelayStateStatus,
}

impl RelayStateRecord {
    /// Returns whether the record outlived `ttl` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        chrono::Duration::from_std(ttl).is_ok_and(|ttl| now >= self.created_at + ttl)
    }
}

/// What [`RelayStateStore::take_matching`] found under a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeOutcome {
    /// The record matched and was removed.
    Taken(RelayStateRecord),
    /// A record exists but belongs to another exchange; it was left in place.
    Mismatch(RelayStateRecord),
    /// No record is stored under the token.
    Missing,
}

/// Storage for RelayState records.
///
/// `take` and `take_matching` must be atomic: when two callers race for the
/// same token, at most one of them gets the record.
#[async_trait]
pub trait RelayStateStore: Send + Sync + Debug {
    /// Stores a fresh record. `ttl` lets the store drop it on its own.
    async fn insert(&self, record: RelayStateRecord, ttl: Duration) -> RelayStateResult<()>;

    /// Removes and returns the record for `token`.
    async fn take(&self, token: &str) -> RelayStateResult<Option<RelayStateRecord>>;

    /// Removes the record for `token` only if it was issued for `request_id`
    /// and addressed to `issuer_entity_id`.
    async fn take_matching(
        &self,
        token: &str,
        request_id: &str,
        issuer_entity_id: &str,
    ) -> RelayStateResult<TakeOutcome>;

    /// Drops every record that outlived `ttl` at `now` and returns how many went.
    async fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> RelayStateResult<usize>;
}

/// Issues and consumes RelayState records.
#[derive(Debug, Clone)]
pub struct RelayStateManager {
    store: Arc<dyn RelayStateStore>,
    ttl: Duration,
}

impl RelayStateManager {
    /// Creates a manager over `store` with records living for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn RelayStateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the record lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Creates a record for an outgoing request and returns its token.
    pub async fn create(
        &self,
        request_id: &str,
        relay_target: &str,
        issuer_entity_id: &str,
        attribute_service_index: Option<u16>,
    ) -> RelayStateResult<String> {
        self.create_at(
            request_id,
            relay_target,
            issuer_entity_id,
            attribute_service_index,
            Utc::now(),
        )
        .await
    }

    /// Like [`RelayStateManager::create`] with an explicit creation time.
    pub async fn create_at(
        &self,
        request_id: &str,
        relay_target: &str,
        issuer_entity_id: &str,
        attribute_service_index: Option<u16>,
        now: DateTime<Utc>,
    ) -> RelayStateResult<String> {
        let token = sf_crypto::random::generate_relay_token();
        let record = RelayStateRecord {
            token: token.clone(),
            request_id: request_id.to_string(),
            relay_target: relay_target.to_string(),
            issuer_entity_id: issuer_entity_id.to_string(),
            attribute_service_index,
            created_at: now,
            status: RelayStateStatus::Created,
        };
        self.store.insert(record, self.ttl).await?;
        tracing::debug!(request_id = %request_id, idp = %issuer_entity_id, "relay state created");
        Ok(token)
    }

    /// Consumes the record for `token`.
    ///
    /// Returns [`RelayStateError::NotFound`] for unknown, consumed and
    /// expired tokens alike. An expired record is removed on the way.
    pub async fn lookup_and_consume(&self, token: &str) -> RelayStateResult<RelayStateRecord> {
        self.lookup_and_consume_at(token, Utc::now()).await
    }

    /// Like [`RelayStateManager::lookup_and_consume`] at an explicit time.
    pub async fn lookup_and_consume_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> RelayStateResult<RelayStateRecord> {
        let mut record = self.store.take(token).await?.ok_or(RelayStateError::NotFound)?;
        if record.status != RelayStateStatus::Created {
            return Err(RelayStateError::NotFound);
        }
        if record.is_expired_at(now, self.ttl) {
            tracing::debug!(request_id = %record.request_id, "relay state expired before use");
            return Err(RelayStateError::NotFound);
        }
        record.status = RelayStateStatus::Consumed;
        Ok(record)
    }

    /// Consumes the record for `token` if it belongs to the response that
    /// answers `request_id` from `issuer_entity_id`.
    ///
    /// A record issued for another request stays untouched and the call
    /// fails with [`RelayStateError::NotFound`]. A record for this request
    /// that was addressed to another IdP also stays, and the call fails with
    /// [`RelayStateError::IssuerMismatch`].
    pub async fn consume_matching_at(
        &self,
        token: &str,
        request_id: &str,
        issuer_entity_id: &str,
        now: DateTime<Utc>,
    ) -> RelayStateResult<RelayStateRecord> {
        match self.store.take_matching(token, request_id, issuer_entity_id).await? {
            TakeOutcome::Taken(mut record) => {
                if record.status != RelayStateStatus::Created || record.is_expired_at(now, self.ttl) {
                    tracing::debug!(request_id = %record.request_id, "relay state expired before use");
                    return Err(RelayStateError::NotFound);
                }
                record.status = RelayStateStatus::Consumed;
                Ok(record)
            }
            TakeOutcome::Mismatch(record) if record.request_id == request_id => {
                Err(RelayStateError::IssuerMismatch {
                    expected: record.issuer_entity_id,
                })
            }
            TakeOutcome::Mismatch(record) => {
                tracing::debug!(
                    request_id = %record.request_id,
                    answered = %request_id,
                    "relay state belongs to another request"
                );
                Err(RelayStateError::NotFound)
            }
            TakeOutcome::Missing => Err(RelayStateError::NotFound),
        }
    }

    /// Drops records that outlived the TTL at `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> RelayStateResult<usize> {
        let swept = self.store.sweep(now, self.ttl).await?;
        if swept > 0 {
            tracing::debug!(swept, "expired relay states dropped");
        }
        Ok(swept)
    }
}
