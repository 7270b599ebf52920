//! # sf-core
//!
//! Core configuration, error handling and audit events shared by the SAML
//! federation crates.
//!
//! - [`config`] - federation configuration loaded from the environment or TOML
//! - [`error`] - configuration-level error type
//! - [`event`] - structured audit events emitted through `tracing`

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::{FederationConfig, RelayStoreConfig, StaleEntityPolicy};
pub use error::{Error, Result};
pub use event::{Event, EventOutcome, EventType};
