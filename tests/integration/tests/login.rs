//! SP-initiated Web Browser SSO between two in-process authorities.

use chrono::Utc;
use sf_saml::bindings::{HttpPostBinding, InboundMessage};
use sf_saml::xml::XmlElement;
use sf_saml::Response;
use sf_trust::attributes::{
    AttributeConsumingService, AttributeDescriptor, AttributeProvider, Evaluators, ReleasePolicy,
    RequestedAttribute, SimplePrincipal, TypedValue,
};
use sf_trust::roles::SpSettings;
use sf_trust::{ConfigurationError, FederationError, ProtocolError, TrustError};

use sf_integration_tests::{Federation, FederationOptions, IDP};

const MAIL: &str = "urn:oid:0.9.2342.19200300.100.1.3";
const DISPLAY_NAME: &str = "urn:oid:2.16.840.1.113730.3.1.241";

fn services() -> Vec<AttributeConsumingService> {
    vec![
        AttributeConsumingService::new(0, "basic")
            .as_default()
            .with_attribute(RequestedAttribute::new("mail", MAIL).required()),
        AttributeConsumingService::new(1, "profile")
            .with_attribute(RequestedAttribute::new("mail", MAIL).required())
            .with_attribute(RequestedAttribute::new("displayName", DISPLAY_NAME)),
    ]
}

fn provider() -> anyhow::Result<AttributeProvider> {
    Ok(AttributeProvider::new(
        vec![
            AttributeDescriptor::new("mail", MAIL),
            AttributeDescriptor::new("displayName", DISPLAY_NAME),
        ],
        Evaluators::new(),
    )?)
}

fn alice() -> SimplePrincipal {
    SimplePrincipal::new("alice")
        .with_property("mail", "alice@example.org")
        .with_property("displayName", "Alice")
}

/// Authority A (`https://idp.example.org`) answers an AuthnRequest carrying
/// `/dashboard`; authority B consumes the token and recovers the target.
#[tokio::test]
async fn test_example_scenario() -> anyhow::Result<()> {
    let federation = Federation::new()?;

    let (request, token) = federation
        .sp
        .build_authn_request(IDP, "/dashboard", None)
        .await?;
    assert_eq!(request.relay_state.as_deref(), Some(token.as_str()));
    assert!(request.redirect_url().is_some());

    let validated = federation
        .idp()
        .validate_authn_request(&request.to_inbound())
        .await?;
    let response = federation.idp().build_response(&validated, &alice())?;

    let xml = response.to_inbound().decode()?.xml;
    let parsed = Response::from_xml(&XmlElement::parse(&xml)?)?;
    assert_eq!(parsed.in_response_to.as_deref(), Some(validated.request.id.as_str()));

    let identity = federation.sp.handle_response(&response.to_inbound()).await?;
    assert_eq!(identity.issuer, IDP);
    assert_eq!(identity.name_id.value, "alice");
    assert_eq!(identity.relay_target, "/dashboard");

    assert!(federation.sp.relay_state().lookup_and_consume(&token).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_replayed_response_is_rejected() -> anyhow::Result<()> {
    let federation = Federation::new()?;
    let (response, _) = federation.login("/", None, &alice()).await?;

    federation.sp.handle_response(&response.to_inbound()).await?;
    let replay = federation.sp.handle_response(&response.to_inbound()).await;
    assert!(matches!(
        replay,
        Err(FederationError::Protocol(ProtocolError::UnknownOrReplayedResponse))
    ));
    Ok(())
}

/// A trusted response posted with another login's token is rejected without
/// consuming that token.
#[tokio::test]
async fn test_crossed_response_keeps_the_other_token() -> anyhow::Result<()> {
    let federation = Federation::new()?;
    let (first, first_token) = federation.login("/first", None, &alice()).await?;
    let (second, _) = federation.login("/second", None, &alice()).await?;

    let crossed = InboundMessage::post_response(
        HttpPostBinding::encode_value(&second.to_inbound().decode()?.xml),
        Some(first_token),
    );
    let result = federation.sp.handle_response(&crossed).await;
    assert!(matches!(
        result,
        Err(FederationError::Protocol(ProtocolError::UnknownOrReplayedResponse))
    ));

    let identity = federation.sp.handle_response(&first.to_inbound()).await?;
    assert_eq!(identity.relay_target, "/first");
    let identity = federation.sp.handle_response(&second.to_inbound()).await?;
    assert_eq!(identity.relay_target, "/second");
    Ok(())
}

/// Flipping one bit of the signed payload breaks the signature.
#[tokio::test]
async fn test_signature_bit_flip_is_rejected() -> anyhow::Result<()> {
    let federation = Federation::new()?;
    let (response, _) = federation.login("/", None, &alice()).await?;

    let xml = response.to_inbound().decode()?.xml;
    let at = xml
        .find(">alice<")
        .ok_or_else(|| anyhow::anyhow!("NameID not found"))?
        + 1;
    let mut bytes = xml.into_bytes();
    // 'a' ^ 0x02 == 'c'
    bytes[at] ^= 0x02;
    let tampered_xml = String::from_utf8(bytes)?;
    let tampered = InboundMessage::post_response(
        HttpPostBinding::encode_value(&tampered_xml),
        response.relay_state.clone(),
    );

    let result = federation.sp.handle_response(&tampered).await;
    assert!(
        matches!(result, Err(FederationError::Trust(TrustError::UntrustedMessage(_)))),
        "unexpected result {result:?}"
    );

    // The genuine response still validates: the token was not burned.
    federation.sp.handle_response(&response.to_inbound()).await?;
    Ok(())
}

/// Past `NotOnOrAfter` the response is expired; one second before, it is not.
#[tokio::test]
async fn test_timing_window() -> anyhow::Result<()> {
    let federation = Federation::with_options(FederationOptions {
        sp_clock_skew_secs: Some(0),
        sp_relay_state_ttl_secs: Some(3600),
        ..FederationOptions::default()
    })?;
    let (response, _) = federation.login("/", None, &alice()).await?;
    let xml = response.to_inbound().decode()?.xml;
    let parsed = Response::from_xml(&XmlElement::parse(&xml)?)?;
    let not_on_or_after = parsed
        .first_assertion()
        .and_then(|a| a.conditions.as_ref())
        .and_then(|c| c.not_on_or_after)
        .ok_or_else(|| anyhow::anyhow!("assertion without NotOnOrAfter"))?;

    let expired = federation
        .sp
        .handle_response_at(&response.to_inbound(), not_on_or_after)
        .await;
    assert!(matches!(
        expired,
        Err(FederationError::Protocol(ProtocolError::ExpiredMessage(_)))
    ));

    let just_in_time = not_on_or_after - chrono::Duration::seconds(1);
    let identity = federation
        .sp
        .handle_response_at(&response.to_inbound(), just_in_time)
        .await?;
    assert_eq!(identity.name_id.value, "alice");
    Ok(())
}

#[tokio::test]
async fn test_response_signed_with_foreign_key_is_rejected() -> anyhow::Result<()> {
    let federation = Federation::new()?;
    let other = Federation::new()?;

    // Same IdP entity ID, different keys: the SP of `federation` does not
    // trust `other`'s IdP signature.
    let (response, _) = other.login("/", None, &alice()).await?;
    let result = federation.sp.handle_response(&response.to_inbound()).await;
    assert!(matches!(
        result,
        Err(FederationError::Trust(TrustError::UntrustedMessage(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_unknown_idp_cannot_be_asked() -> anyhow::Result<()> {
    let federation = Federation::new()?;
    let result = federation
        .sp
        .build_authn_request("https://unknown.example.org", "/", None)
        .await;
    assert!(matches!(
        result,
        Err(FederationError::Trust(TrustError::UnknownEntity(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_signed_authn_requests() -> anyhow::Result<()> {
    let federation = Federation::with_options(FederationOptions {
        sp: SpSettings {
            sign_authn_requests: true,
            ..SpSettings::default()
        },
        ..FederationOptions::default()
    })?;
    let (request, _) = federation.sp.build_authn_request(IDP, "/", None).await?;
    let url = request
        .redirect_url()
        .ok_or_else(|| anyhow::anyhow!("expected a redirect"))?;
    assert!(url.contains("Signature="));

    federation
        .idp()
        .validate_authn_request(&request.to_inbound())
        .await?;
    Ok(())
}

/// Services at index 0 (default) and 1: no index resolves 0, 1 resolves 1,
/// anything else is a configuration error.
#[tokio::test]
async fn test_attribute_default_resolution() -> anyhow::Result<()> {
    let federation = Federation::with_options(FederationOptions {
        services: services(),
        ..FederationOptions::default()
    })?;

    assert_eq!(federation.sp.resolve_attribute_consuming_service(None)?.index, 0);
    assert_eq!(federation.sp.resolve_attribute_consuming_service(Some(1))?.index, 1);
    assert!(matches!(
        federation.sp.resolve_attribute_consuming_service(Some(7)),
        Err(FederationError::Configuration(ConfigurationError::UndefinedServiceIndex(7)))
    ));
    assert!(matches!(
        federation.sp.build_authn_request(IDP, "/", Some(7)).await,
        Err(FederationError::Configuration(ConfigurationError::UndefinedServiceIndex(7)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_attributes_are_released_for_the_requested_service() -> anyhow::Result<()> {
    let federation = Federation::with_options(FederationOptions {
        services: services(),
        provider: Some(provider()?),
        ..FederationOptions::default()
    })?;

    let (response, _) = federation.login("/", None, &alice()).await?;
    let identity = federation.sp.handle_response(&response.to_inbound()).await?;
    assert_eq!(
        identity.attributes.get("mail"),
        Some(&vec![TypedValue::from("alice@example.org")])
    );
    assert!(!identity.attributes.contains_key("displayName"));

    let (response, _) = federation.login("/", Some(1), &alice()).await?;
    let identity = federation.sp.handle_response(&response.to_inbound()).await?;
    assert_eq!(
        identity.attributes.get("displayName"),
        Some(&vec![TypedValue::from("Alice")])
    );
    Ok(())
}

/// The IdP decides per exchange whether a missing required attribute fails
/// the Response or is left out of it.
#[tokio::test]
async fn test_missing_required_attribute_is_the_callers_choice() -> anyhow::Result<()> {
    let federation = Federation::with_options(FederationOptions {
        services: services(),
        provider: Some(provider()?),
        ..FederationOptions::default()
    })?;
    let bob = SimplePrincipal::new("bob").with_property("displayName", "Bob");

    let (request, _) = federation.sp.build_authn_request(IDP, "/", Some(1)).await?;
    let validated = federation
        .idp()
        .validate_authn_request(&request.to_inbound())
        .await?;
    let rejected =
        federation
            .idp()
            .build_response_with_policy(&validated, &bob, ReleasePolicy::RejectIncomplete);
    assert!(matches!(rejected, Err(FederationError::Attributes(_))));

    let response =
        federation
            .idp()
            .build_response_with_policy(&validated, &bob, ReleasePolicy::ReleasePartial)?;
    let identity = federation.sp.handle_response(&response.to_inbound()).await?;
    assert_eq!(
        identity.attributes.get("displayName"),
        Some(&vec![TypedValue::from("Bob")])
    );
    assert!(!identity.attributes.contains_key("mail"));
    Ok(())
}

#[tokio::test]
async fn test_expired_relay_state_rejects_the_response() -> anyhow::Result<()> {
    let federation = Federation::new()?;
    let (response, _) = federation.login("/", None, &alice()).await?;

    let ttl = federation.sp.relay_state().ttl();
    let swept = federation
        .sp
        .relay_state()
        .sweep_expired(Utc::now() + chrono::Duration::from_std(ttl)? + chrono::Duration::seconds(1))
        .await?;
    assert_eq!(swept, 1);

    let result = federation.sp.handle_response(&response.to_inbound()).await;
    assert!(matches!(
        result,
        Err(FederationError::Protocol(ProtocolError::UnknownOrReplayedResponse))
    ));
    Ok(())
}
