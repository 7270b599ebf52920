//! SAML2 roles an authority can play.
//!
//! A role is built against an [`Authority`](crate::authority::Authority),
//! keeps only a weak handle back to it and becomes active once registered.
//! Each kind can be registered at most once per authority; the composite
//! identity provider with attribute release occupies two kinds.

mod composite;
mod idp;
mod sp;

pub use composite::IdentityAttributeProviderRole;
pub use idp::{IdentityProviderRole, IdpSettings, ValidatedAuthnRequest};
pub use sp::{ResolvedIdentity, ServiceProviderRole, SpSettings};

use std::fmt::{self, Debug};

use serde::{Deserialize, Serialize};
use sf_saml::metadata::{IdpSsoDescriptor, KeyDescriptor, SpSsoDescriptor};

use crate::authority::AuthorityHandle;

/// Kinds of role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Identity provider.
    IdentityProvider,
    /// Service provider.
    ServiceProvider,
    /// Attribute provider; only registered together with an identity provider.
    AttributeProvider,
}

impl RoleKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdentityProvider => "identity provider",
            Self::ServiceProvider => "service provider",
            Self::AttributeProvider => "attribute provider",
        }
    }

    /// Returns the URL path segment of the role below the authority's base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::IdentityProvider | Self::AttributeProvider => "idp",
            Self::ServiceProvider => "sp",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The metadata a role contributes to its authority's entity descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleDescriptor {
    /// An `md:IDPSSODescriptor`.
    Idp(IdpSsoDescriptor),
    /// An `md:SPSSODescriptor`.
    Sp(SpSsoDescriptor),
}

/// Common surface of every role.
pub trait Role: Send + Sync + Debug {
    /// The kinds this role occupies.
    fn kinds(&self) -> &'static [RoleKind];

    /// The authority the role was built for.
    fn owning_authority(&self) -> &AuthorityHandle;

    /// Supported name ID formats, most preferred first.
    fn name_id_formats(&self) -> &[String];

    /// Base URL of the role's endpoints.
    fn url(&self) -> &str;

    /// Builds the role's metadata with the authority's `keys`.
    fn descriptor(&self, keys: &[KeyDescriptor]) -> RoleDescriptor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_provider_lives_under_the_idp() {
        assert_eq!(RoleKind::AttributeProvider.path(), RoleKind::IdentityProvider.path());
        assert_eq!(RoleKind::ServiceProvider.path(), "sp");
    }
}
