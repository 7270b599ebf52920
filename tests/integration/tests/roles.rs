//! Role registration and authority lifecycle.

use std::sync::Arc;

use sf_trust::attributes::{AttributeDescriptor, AttributeProvider, Evaluators};
use sf_trust::roles::{IdentityAttributeProviderRole, IdentityProviderRole, IdpSettings, ServiceProviderRole, SpSettings};
use sf_trust::{AuthorityDirectory, ConfigurationError, FederationError, RoleKind};

use sf_integration_tests::{authority, capability, config, IDP, SP};

#[tokio::test]
async fn test_one_role_per_kind() -> anyhow::Result<()> {
    let authority = authority(config(IDP))?;
    let idp = Arc::new(IdentityProviderRole::new(&authority, IdpSettings::default())?);
    authority.register_role(idp)?;

    let provider = AttributeProvider::new(
        vec![AttributeDescriptor::new("mail", "urn:oid:0.9.2342.19200300.100.1.3")],
        Evaluators::new(),
    )?;
    let composite = Arc::new(IdentityAttributeProviderRole::new(
        &authority,
        IdpSettings::default(),
        provider,
    )?);
    let result = authority.register_role(composite.clone());
    assert!(matches!(
        result,
        Err(FederationError::Configuration(ConfigurationError::AlreadyRegistered(_)))
    ));
    // Nothing of the composite was taken.
    assert!(authority.role(RoleKind::AttributeProvider).is_none());

    authority.unregister_role(RoleKind::IdentityProvider)?;
    authority.register_role(composite)?;
    assert!(authority.role(RoleKind::IdentityProvider).is_some());
    assert!(authority.role(RoleKind::AttributeProvider).is_some());

    // Unregistering either kind frees both.
    authority.unregister_role(RoleKind::AttributeProvider)?;
    assert!(authority.role(RoleKind::IdentityProvider).is_none());
    Ok(())
}

#[tokio::test]
async fn test_idp_and_sp_coexist() -> anyhow::Result<()> {
    let authority = authority(config(IDP))?;
    authority.register_role(Arc::new(IdentityProviderRole::new(&authority, IdpSettings::default())?))?;
    authority.register_role(Arc::new(ServiceProviderRole::new(
        &authority,
        SpSettings::default(),
        Vec::new(),
    )?))?;

    let published = authority.publish_metadata()?;
    assert!(published.descriptor.idp_sso.is_some());
    assert!(published.descriptor.sp_sso.is_some());
    Ok(())
}

#[tokio::test]
async fn test_authority_with_roles_cannot_be_removed() -> anyhow::Result<()> {
    let directory = AuthorityDirectory::new();
    let authority = directory.create(config(IDP), Arc::new(capability("idp.example.org")?))?;
    directory.register_role(
        authority.id(),
        Arc::new(IdentityProviderRole::new(&authority, IdpSettings::default())?),
    )?;

    let result = directory.remove(authority.id());
    assert!(matches!(
        result,
        Err(FederationError::Configuration(ConfigurationError::DependentRoles(ref roles)))
            if roles == &["identity provider".to_string()]
    ));
    assert_eq!(directory.len(), 1);

    authority.unregister_role(RoleKind::IdentityProvider)?;
    directory.remove(authority.id())?;
    assert!(directory.is_empty());
    assert!(directory.locate_by_entity_id(IDP).is_none());
    Ok(())
}

#[tokio::test]
async fn test_role_of_another_authority_is_rejected() -> anyhow::Result<()> {
    let idp_authority = authority(config(IDP))?;
    let sp_authority = authority(config(SP))?;
    let role = Arc::new(IdentityProviderRole::new(&idp_authority, IdpSettings::default())?);

    let result = sp_authority.register_role(role);
    assert!(matches!(
        result,
        Err(FederationError::Configuration(ConfigurationError::AuthorityNotFound(_)))
    ));
    assert!(sp_authority.role_kinds().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_authority_without_roles_publishes_nothing() -> anyhow::Result<()> {
    let authority = authority(config(SP))?;
    assert!(matches!(
        authority.publish_metadata(),
        Err(FederationError::Configuration(ConfigurationError::NoRolesRegistered))
    ));
    Ok(())
}
