//! # sf-relay-redis
//!
//! Redis-backed RelayState store, for service providers running on more
//! than one instance.
//!
//! Records are stored as JSON under a prefixed key with a Redis expiry, so
//! Redis drops them on its own once the TTL passes. Consumption uses
//! `GETDEL`, which keeps a token single-use across instances.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sf_relay_redis::{RedisConfig, RedisRelayStateStore};
//! use sf_trust::strategy::StrategyRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RedisRelayStateStore::connect(RedisConfig::new("redis://localhost:6379")).await?;
//!     let strategies = StrategyRegistry::new();
//!     strategies.register_relay_store("redis", Arc::new(store));
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod store;

pub use config::RedisConfig;
pub use store::RedisRelayStateStore;
