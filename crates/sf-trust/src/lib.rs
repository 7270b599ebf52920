//! # sf-trust
//!
//! Trust and session engine of the SAML federation.
//!
//! An [`Authority`] owns one entity ID, its keys and the roles it plays.
//! Roles publish themselves into the authority's metadata and drive the
//! Web Browser SSO profile:
//!
//! - [`roles::IdentityProviderRole`] validates AuthnRequests and issues
//!   Responses
//! - [`roles::ServiceProviderRole`] issues AuthnRequests and consumes
//!   Responses, correlating them through RelayState
//! - [`roles::IdentityAttributeProviderRole`] is an IdP that also releases
//!   attributes
//!
//! Partner metadata lives in the authority's [`registry::EntityRegistry`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attributes;
pub mod authority;
pub mod error;
pub mod message;
pub mod registry;
pub mod relay_state;
pub mod roles;
pub mod strategy;

pub use authority::{Authority, AuthorityBuilder, AuthorityDirectory, AuthorityHandle, PublishedMetadata};
pub use error::{
    AttributeError, AttributeErrors, ConfigurationError, ErrorKind, FederationError, FederationResult,
    ProtocolError, RelayStateError, TrustError,
};
pub use registry::{EntityRecord, EntityRegistry, MetadataFetcher};
pub use relay_state::{
    MemoryRelayStateStore, RelayStateManager, RelayStateRecord, RelayStateStore, TakeOutcome,
};
pub use roles::{Role, RoleKind};
