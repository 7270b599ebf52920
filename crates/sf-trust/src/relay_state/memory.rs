//! Process-local RelayState store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{RelayStateRecord, RelayStateResult, RelayStateStore, TakeOutcome};

/// RelayState store backed by a concurrent map.
///
/// Records live as long as the process. Use a shared store when several
/// instances serve the same SP.
#[derive(Debug, Default)]
pub struct MemoryRelayStateStore {
    records: DashMap<String, RelayStateRecord>,
}

impl MemoryRelayStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RelayStateStore for MemoryRelayStateStore {
    async fn insert(&self, record: RelayStateRecord, _ttl: Duration) -> RelayStateResult<()> {
        self.records.insert(record.token.clone(), record);
        Ok(())
    }

    async fn take(&self, token: &str) -> RelayStateResult<Option<RelayStateRecord>> {
        Ok(self.records.remove(token).map(|(_, record)| record))
    }

    async fn take_matching(
        &self,
        token: &str,
        request_id: &str,
        issuer_entity_id: &str,
    ) -> RelayStateResult<TakeOutcome> {
        // The entry guard holds the shard lock across the compare and the remove.
        Ok(match self.records.entry(token.to_string()) {
            Entry::Occupied(entry) => {
                let record = entry.get();
                if record.request_id == request_id && record.issuer_entity_id == issuer_entity_id {
                    TakeOutcome::Taken(entry.remove())
                } else {
                    TakeOutcome::Mismatch(record.clone())
                }
            }
            Entry::Vacant(_) => TakeOutcome::Missing,
        })
    }

    async fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> RelayStateResult<usize> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired_at(now, ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay_state::RelayStateStatus;

    fn record(token: &str, created_at: DateTime<Utc>) -> RelayStateRecord {
        RelayStateRecord {
            token: token.to_string(),
            request_id: format!("_{token}"),
            relay_target: "/".to_string(),
            issuer_entity_id: "https://idp.example.org".to_string(),
            attribute_service_index: None,
            created_at,
            status: RelayStateStatus::Created,
        }
    }

    #[tokio::test]
    async fn take_matching_only_removes_on_match() {
        let store = MemoryRelayStateStore::new();
        let ttl = Duration::from_secs(60);
        store.insert(record("a", Utc::now()), ttl).await.unwrap();

        assert!(matches!(
            store.take_matching("a", "_b", "https://idp.example.org").await.unwrap(),
            TakeOutcome::Mismatch(_)
        ));
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.take_matching("a", "_a", "https://idp.example.org").await.unwrap(),
            TakeOutcome::Taken(_)
        ));
        assert!(store.is_empty());
        assert_eq!(
            store.take_matching("a", "_a", "https://idp.example.org").await.unwrap(),
            TakeOutcome::Missing
        );
    }

    #[tokio::test]
    async fn sweep_counts_what_it_removed() {
        let store = MemoryRelayStateStore::new();
        let ttl = Duration::from_secs(60);
        let now = Utc::now();
        let old = now - chrono::Duration::seconds(120);
        store.insert(record("old1", old), ttl).await.unwrap();
        store.insert(record("old2", old), ttl).await.unwrap();
        store.insert(record("fresh", now), ttl).await.unwrap();

        assert_eq!(store.sweep(now, ttl).await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.sweep(now, ttl).await.unwrap(), 0);
    }
}
