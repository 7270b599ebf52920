//! Redis RelayState store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::interfaces::LuaInterface;
use fred::prelude::*;
use fred::types::scan::Scanner;
use fred::types::Value;
use futures::TryStreamExt;
use sf_trust::relay_state::{RelayStateRecord, RelayStateResult, RelayStateStore, TakeOutcome};
use sf_trust::RelayStateError;

use crate::config::RedisConfig;
use crate::error::{from_redis_error, from_serde_error};

/// Deletes `KEYS[1]` only when its record carries request ID `ARGV[1]` and
/// issuer `ARGV[2]`. Replies `{0}` when absent, `{1, record}` when taken and
/// `{2, record}` when left in place.
const TAKE_MATCHING: &str = r"
local value = redis.call('GET', KEYS[1])
if not value then
  return {0}
end
local record = cjson.decode(value)
if record.request_id == ARGV[1] and record.issuer_entity_id == ARGV[2] then
  redis.call('DEL', KEYS[1])
  return {1, value}
end
return {2, value}
";

/// Converts seconds to the signed form Redis expirations take.
#[allow(clippy::cast_possible_wrap)]
const fn seconds_to_i64(seconds: u64) -> i64 {
    seconds as i64
}

/// RelayState store shared between instances through Redis.
pub struct RedisRelayStateStore {
    client: Client,
    config: RedisConfig,
}

impl std::fmt::Debug for RedisRelayStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRelayStateStore")
            .field("key_prefix", &self.config.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisRelayStateStore {
    /// Connects to Redis.
    ///
    /// ## Errors
    ///
    /// Returns an error if the URL is invalid or the connection cannot be
    /// established.
    pub async fn connect(config: RedisConfig) -> RelayStateResult<Self> {
        let redis_config = Config::from_url(&config.url).map_err(from_redis_error)?;
        let connection = ConnectionConfig {
            connection_timeout: Duration::from_millis(config.connect_timeout_ms),
            ..ConnectionConfig::default()
        };
        let client = Client::new(
            redis_config,
            None,
            Some(connection),
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );
        client.init().await.map_err(from_redis_error)?;
        tracing::info!(key_prefix = %config.key_prefix, "connected RelayState store to redis");
        Ok(Self::with_client(client, config))
    }

    /// Wraps an already connected client.
    #[must_use]
    pub const fn with_client(client: Client, config: RedisConfig) -> Self {
        Self { client, config }
    }

    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    fn key(&self, token: &str) -> String {
        self.config.prefixed_key(token)
    }

    async fn scan_keys(&self, pattern: &str) -> RelayStateResult<Vec<String>> {
        let mut scanner = self.client.scan(pattern, None, None);
        let mut keys = Vec::new();

        while let Some(result) = scanner.try_next().await.map_err(from_redis_error)? {
            if let Some(page) = result.results() {
                for value in page {
                    if let Some(s) = value.as_str() {
                        keys.push(s.to_string());
                    }
                }
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl RelayStateStore for RedisRelayStateStore {
    async fn insert(&self, record: RelayStateRecord, ttl: Duration) -> RelayStateResult<()> {
        let key = self.key(&record.token);
        let serialized = serde_json::to_string(&record).map_err(from_serde_error)?;
        let seconds = seconds_to_i64(ttl.as_secs().max(1));

        let stored: Option<String> = self
            .client
            .set(
                &key,
                serialized,
                Some(Expiration::EX(seconds)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(from_redis_error)?;
        if stored.is_none() {
            return Err(RelayStateError::Store(format!(
                "relay state token {} already exists",
                record.token
            )));
        }
        Ok(())
    }

    async fn take(&self, token: &str) -> RelayStateResult<Option<RelayStateRecord>> {
        let key = self.key(token);
        let value: Option<String> = self.client.getdel(&key).await.map_err(from_redis_error)?;
        value
            .map(|v| serde_json::from_str(&v).map_err(from_serde_error))
            .transpose()
    }

    async fn take_matching(
        &self,
        token: &str,
        request_id: &str,
        issuer_entity_id: &str,
    ) -> RelayStateResult<TakeOutcome> {
        let key = self.key(token);
        let reply: Vec<Value> = self
            .client
            .eval(
                TAKE_MATCHING,
                key,
                vec![request_id.to_string(), issuer_entity_id.to_string()],
            )
            .await
            .map_err(from_redis_error)?;

        let record = |value: Option<&Value>| -> RelayStateResult<RelayStateRecord> {
            let json = value.and_then(Value::as_str).ok_or_else(|| {
                RelayStateError::Store("take script returned no record".to_string())
            })?;
            serde_json::from_str(&json).map_err(from_serde_error)
        };
        match reply.first().and_then(Value::as_i64) {
            Some(0) => Ok(TakeOutcome::Missing),
            Some(1) => Ok(TakeOutcome::Taken(record(reply.get(1))?)),
            Some(2) => Ok(TakeOutcome::Mismatch(record(reply.get(1))?)),
            other => Err(RelayStateError::Store(format!(
                "unexpected take script reply {other:?}"
            ))),
        }
    }

    async fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> RelayStateResult<usize> {
        let pattern = self.key("*");
        let mut removed = 0;
        for key in self.scan_keys(&pattern).await? {
            let value: Option<String> = self.client.get(&key).await.map_err(from_redis_error)?;
            let Some(value) = value else {
                continue;
            };
            let expired = match serde_json::from_str::<RelayStateRecord>(&value) {
                Ok(record) => record.is_expired_at(now, ttl),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "dropping unreadable relay state record");
                    true
                }
            };
            if expired {
                let count: i64 = self.client.del(&key).await.map_err(from_redis_error)?;
                if count > 0 {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    //! These tests talk to the Redis named by `REDIS_URL` and are skipped
    //! when it is unset.

    use std::sync::Arc;

    use sf_trust::relay_state::RelayStateManager;

    use super::*;

    async fn store() -> Option<RedisRelayStateStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let prefix = format!("sf-test:{}:", uuid::Uuid::new_v4());
        Some(
            RedisRelayStateStore::connect(RedisConfig::new(url).key_prefix(prefix))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn token_is_consumed_once() {
        let Some(store) = store().await else {
            return;
        };
        let manager = RelayStateManager::new(Arc::new(store), Duration::from_secs(300));
        let token = manager
            .create("_req1", "/dashboard", "https://idp.example.org", None)
            .await
            .unwrap();

        let record = manager.lookup_and_consume(&token).await.unwrap();
        assert_eq!(record.relay_target, "/dashboard");
        assert!(matches!(
            manager.lookup_and_consume(&token).await,
            Err(RelayStateError::NotFound)
        ));
    }

    #[tokio::test]
    async fn mismatched_take_keeps_the_record() {
        let Some(store) = store().await else {
            return;
        };
        let manager = RelayStateManager::new(Arc::new(store), Duration::from_secs(300));
        let now = Utc::now();
        let token = manager
            .create_at("_req3", "/", "https://idp.example.org", None, now)
            .await
            .unwrap();

        assert!(matches!(
            manager
                .consume_matching_at(&token, "_other", "https://idp.example.org", now)
                .await,
            Err(RelayStateError::NotFound)
        ));
        let record = manager
            .consume_matching_at(&token, "_req3", "https://idp.example.org", now)
            .await
            .unwrap();
        assert_eq!(record.request_id, "_req3");
    }

    #[tokio::test]
    async fn sweep_drops_expired_records() {
        let Some(store) = store().await else {
            return;
        };
        let manager = RelayStateManager::new(Arc::new(store), Duration::from_secs(300));
        let created = Utc::now() - chrono::Duration::seconds(600);
        let token = manager
            .create_at("_req2", "/", "https://idp.example.org", None, created)
            .await
            .unwrap();

        assert_eq!(manager.sweep_expired(Utc::now()).await.unwrap(), 1);
        assert!(manager.lookup_and_consume(&token).await.is_err());
    }
}
