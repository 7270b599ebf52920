//! Publishing metadata and trusting partners through it.

use std::sync::Arc;

use chrono::Utc;
use sf_crypto::CryptoCapability;
use sf_saml::metadata::EntityDescriptor;
use sf_trust::registry::NoFetch;
use sf_trust::roles::{IdentityProviderRole, IdpSettings, ServiceProviderRole, SpSettings};
use sf_trust::{Authority, ConfigurationError, FederationError, RoleKind, TrustError};

use sf_integration_tests::{authority, capability, config, exchange_metadata, IDP, SP};

fn idp_authority() -> anyhow::Result<Authority> {
    let authority = authority(config(IDP))?;
    authority.register_role(Arc::new(IdentityProviderRole::new(&authority, IdpSettings::default())?))?;
    Ok(authority)
}

fn sp_authority() -> anyhow::Result<Authority> {
    let authority = authority(config(SP))?;
    authority.register_role(Arc::new(ServiceProviderRole::new(
        &authority,
        SpSettings::default(),
        Vec::new(),
    )?))?;
    Ok(authority)
}

#[tokio::test]
async fn test_published_metadata_round_trips() -> anyhow::Result<()> {
    let idp = idp_authority()?;
    let sp = sp_authority()?;
    let published = idp.publish_metadata()?;

    let parsed = EntityDescriptor::parse(&published.document)?;
    assert_eq!(parsed, published.descriptor);
    assert_eq!(parsed.entity_id, IDP);
    assert_eq!(parsed.valid_until, Some(published.valid_until));

    sp.upsert_entity(&published.document)?;
    let record = sp.resolve_entity(IDP).await?;
    assert_eq!(record.descriptor, published.descriptor);
    assert!(!record.stale);
    Ok(())
}

#[tokio::test]
async fn test_own_metadata_resolves_and_is_protected() -> anyhow::Result<()> {
    let idp = idp_authority()?;
    let record = idp.resolve_entity(IDP).await?;
    assert_eq!(record.descriptor, idp.publish_metadata()?.descriptor);

    let other = idp_authority()?;
    let foreign = other.publish_metadata()?;
    assert!(matches!(
        idp.upsert_entity(&foreign.document),
        Err(FederationError::Configuration(ConfigurationError::ProtectedEntity(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_metadata_is_cached_until_roles_change() -> anyhow::Result<()> {
    let authority = idp_authority()?;
    let first = authority.publish_metadata()?;
    let second = authority.publish_metadata()?;
    assert!(Arc::ptr_eq(&first, &second));

    authority.register_role(Arc::new(ServiceProviderRole::new(
        &authority,
        SpSettings::default(),
        Vec::new(),
    )?))?;
    let third = authority.publish_metadata()?;
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(third.descriptor.sp_sso.is_some());

    authority.unregister_role(RoleKind::ServiceProvider)?;
    assert!(authority.publish_metadata()?.descriptor.sp_sso.is_none());
    Ok(())
}

#[tokio::test]
async fn test_metadata_is_regenerated_after_valid_until() -> anyhow::Result<()> {
    let authority = idp_authority()?;
    let now = Utc::now();
    let first = authority.publish_metadata_at(now)?;
    let later = authority.publish_metadata_at(first.valid_until)?;
    assert!(!Arc::ptr_eq(&first, &later));
    assert_eq!(later.generated_at, first.valid_until);
    assert!(later.valid_until > first.valid_until);
    Ok(())
}

#[tokio::test]
async fn test_expired_partner_metadata_is_rejected() -> anyhow::Result<()> {
    let idp = idp_authority()?;
    let sp = sp_authority()?;
    let long_ago = Utc::now() - chrono::Duration::days(30);
    sp.upsert_entity(&idp.publish_metadata_at(long_ago)?.document)?;

    let result = sp.resolve_entity(IDP).await;
    assert!(matches!(
        result,
        Err(FederationError::Trust(TrustError::ExpiredMetadata(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_removed_partner_is_unknown() -> anyhow::Result<()> {
    let idp = idp_authority()?;
    let sp = sp_authority()?;
    exchange_metadata(&idp, &sp)?;

    sp.remove_entity(IDP)?;
    assert!(matches!(
        sp.resolve_entity(IDP).await,
        Err(FederationError::Trust(TrustError::UnknownEntity(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_next_certificate_is_published() -> anyhow::Result<()> {
    let current = capability("idp.example.org")?;
    let next = capability("idp.example.org")?.certificate().clone();
    let crypto = current.with_next_certificate(next.clone());

    let authority = Authority::builder(config(IDP), Arc::new(crypto))
        .with_fetcher(Arc::new(NoFetch))
        .build()?;
    authority.register_role(Arc::new(IdentityProviderRole::new(&authority, IdpSettings::default())?))?;

    let published = authority.publish_metadata()?;
    let fingerprints: Vec<_> = published
        .descriptor
        .idp_sso
        .as_ref()
        .map(|idp| idp.key_descriptors.iter().map(|k| k.certificate.fingerprint()).collect())
        .unwrap_or_default();
    assert_eq!(fingerprints.len(), 2);
    assert_eq!(fingerprints[1], next.fingerprint());
    Ok(())
}
