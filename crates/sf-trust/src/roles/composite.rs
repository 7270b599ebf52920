//! Identity provider that also releases attributes.

use chrono::{DateTime, Utc};
use sf_saml::bindings::{InboundMessage, OutboundMessage};
use sf_saml::metadata::KeyDescriptor;

use super::idp::{IdentityProviderRole, IdpSettings, ValidatedAuthnRequest};
use super::{Role, RoleDescriptor, RoleKind};
use crate::attributes::{AttributeProvider, Principal, ReleasePolicy};
use crate::authority::{Authority, AuthorityHandle};
use crate::error::{FederationError, FederationResult};

const KINDS: &[RoleKind] = &[RoleKind::IdentityProvider, RoleKind::AttributeProvider];

/// An identity provider whose assertions carry the attributes the SP asks for.
///
/// Occupies both the identity provider and the attribute provider kind.
#[derive(Debug)]
pub struct IdentityAttributeProviderRole {
    idp: IdentityProviderRole,
    provider: AttributeProvider,
}

impl IdentityAttributeProviderRole {
    /// Creates the composite role for `authority`.
    pub fn new(
        authority: &Authority,
        settings: IdpSettings,
        provider: AttributeProvider,
    ) -> FederationResult<Self> {
        Ok(Self {
            idp: IdentityProviderRole::build(authority, settings, Some(provider.clone()), KINDS)?,
            provider,
        })
    }

    /// Returns the identity provider part.
    #[must_use]
    pub const fn identity_provider(&self) -> &IdentityProviderRole {
        &self.idp
    }

    /// Returns the attribute provider part.
    #[must_use]
    pub const fn attribute_provider(&self) -> &AttributeProvider {
        &self.provider
    }

    /// See [`IdentityProviderRole::validate_authn_request`].
    pub async fn validate_authn_request(
        &self,
        inbound: &InboundMessage,
    ) -> FederationResult<ValidatedAuthnRequest> {
        self.idp.validate_authn_request(inbound).await
    }

    /// See [`IdentityProviderRole::validate_authn_request_at`].
    pub async fn validate_authn_request_at(
        &self,
        inbound: &InboundMessage,
        now: DateTime<Utc>,
    ) -> FederationResult<ValidatedAuthnRequest> {
        self.idp.validate_authn_request_at(inbound, now).await
    }

    /// See [`IdentityProviderRole::build_response`].
    pub fn build_response(
        &self,
        validated: &ValidatedAuthnRequest,
        principal: &dyn Principal,
    ) -> FederationResult<OutboundMessage> {
        self.idp.build_response(validated, principal)
    }

    /// See [`IdentityProviderRole::build_response_with_policy`].
    pub fn build_response_with_policy(
        &self,
        validated: &ValidatedAuthnRequest,
        principal: &dyn Principal,
        policy: ReleasePolicy,
    ) -> FederationResult<OutboundMessage> {
        self.idp.build_response_with_policy(validated, principal, policy)
    }

    /// See [`IdentityProviderRole::error_response`].
    pub fn error_response(
        &self,
        validated: &ValidatedAuthnRequest,
        error: &FederationError,
    ) -> FederationResult<OutboundMessage> {
        self.idp.error_response(validated, error)
    }
}

impl Role for IdentityAttributeProviderRole {
    fn kinds(&self) -> &'static [RoleKind] {
        KINDS
    }

    fn owning_authority(&self) -> &AuthorityHandle {
        self.idp.owning_authority()
    }

    fn name_id_formats(&self) -> &[String] {
        self.idp.name_id_formats()
    }

    fn url(&self) -> &str {
        self.idp.url()
    }

    fn descriptor(&self, keys: &[KeyDescriptor]) -> RoleDescriptor {
        RoleDescriptor::Idp(self.idp.idp_descriptor(keys))
    }
}
