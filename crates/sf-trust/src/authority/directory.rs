use std::sync::Arc;

use dashmap::DashMap;
use sf_core::FederationConfig;
use sf_crypto::CryptoCapability;
use uuid::Uuid;

use super::Authority;
use crate::error::{ConfigurationError, FederationResult};
use crate::roles::Role;

/// Authorities of one process, keyed by ID.
///
/// At most one authority exists per entity ID.
#[derive(Debug, Default)]
pub struct AuthorityDirectory {
    authorities: DashMap<Uuid, Authority>,
}

impl AuthorityDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an authority from `config` and adds it.
    pub fn create(
        &self,
        config: FederationConfig,
        crypto: Arc<dyn CryptoCapability>,
    ) -> FederationResult<Authority> {
        if self.locate_by_entity_id(&config.authority.entity_id).is_some() {
            return Err(ConfigurationError::AuthorityExists(config.authority.entity_id).into());
        }
        let authority = Authority::new(config, crypto)?;
        self.insert(authority.clone())?;
        Ok(authority)
    }

    /// Adds an authority built elsewhere.
    pub fn insert(&self, authority: Authority) -> FederationResult<()> {
        if self.locate_by_entity_id(authority.entity_id()).is_some() {
            return Err(ConfigurationError::AuthorityExists(authority.entity_id().to_string()).into());
        }
        self.authorities.insert(authority.id(), authority);
        Ok(())
    }

    /// Returns the authority with `id`.
    pub fn locate(&self, id: Uuid) -> FederationResult<Authority> {
        self.authorities
            .get(&id)
            .map(|a| a.value().clone())
            .ok_or_else(|| ConfigurationError::AuthorityNotFound(id.to_string()).into())
    }

    /// Returns the authority for `entity_id`, if any.
    #[must_use]
    pub fn locate_by_entity_id(&self, entity_id: &str) -> Option<Authority> {
        self.authorities
            .iter()
            .find(|a| a.value().entity_id() == entity_id)
            .map(|a| a.value().clone())
    }

    /// Removes an authority. Fails while it still has roles.
    pub fn remove(&self, id: Uuid) -> FederationResult<Authority> {
        let authority = self.locate(id)?;
        authority.ensure_removable()?;
        self.authorities
            .remove(&id)
            .map(|(_, a)| a)
            .ok_or_else(|| ConfigurationError::AuthorityNotFound(id.to_string()).into())
    }

    /// Registers `role` with the authority `id`.
    pub fn register_role(&self, id: Uuid, role: Arc<dyn Role>) -> FederationResult<()> {
        self.locate(id)?.register_role(role)
    }

    /// Returns the number of authorities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    /// Returns whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }
}
