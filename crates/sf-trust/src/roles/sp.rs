//! Service provider role.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sf_core::{Event, EventType};
use sf_saml::bindings::{InboundMessage, OutboundMessage, SamlMessageType};
use sf_saml::metadata::{Endpoint, IndexedEndpoint, KeyDescriptor, SpSsoDescriptor};
use sf_saml::xml::XmlElement;
use sf_saml::{AuthnRequest, NameId, NameIdPolicy, Response, SamlBinding};

use super::{Role, RoleDescriptor, RoleKind};
use crate::attributes::{
    map_received_attributes, resolve_attribute_values, AttributeConsumingService, Evaluators,
    Principal, ServiceSet, TypedValue,
};
use crate::authority::{Authority, AuthorityHandle};
use crate::error::{
    FederationError, FederationResult, ProtocolError, RelayStateError, TrustError,
};
use crate::message::{inbound_error, MessageBuilder, MessageValidator};
use crate::relay_state::RelayStateManager;

/// Service provider settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpSettings {
    /// Sign every AuthnRequest, whatever the IdP asks for.
    pub sign_authn_requests: bool,
    /// Require assertions to carry their own signature.
    pub want_assertions_signed: bool,
    /// Binding used to send AuthnRequests.
    pub request_binding: SamlBinding,
}

impl Default for SpSettings {
    fn default() -> Self {
        Self {
            sign_authn_requests: false,
            want_assertions_signed: false,
            request_binding: SamlBinding::HttpRedirect,
        }
    }
}

/// The outcome of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    /// Entity ID of the asserting IdP.
    pub issuer: String,
    /// The subject's name ID, format included.
    pub name_id: NameId,
    /// Session index of the authentication statement.
    pub session_index: Option<String>,
    /// When the subject authenticated.
    pub authn_instant: Option<DateTime<Utc>>,
    /// Received attributes keyed by local id.
    pub attributes: BTreeMap<String, Vec<TypedValue>>,
    /// Where the user wanted to go.
    pub relay_target: String,
}

/// The service provider role.
#[derive(Debug)]
pub struct ServiceProviderRole {
    authority: AuthorityHandle,
    settings: SpSettings,
    name_id_formats: Vec<String>,
    url: String,
    services: ServiceSet,
    evaluators: Evaluators,
    relay_state: RelayStateManager,
}

impl ServiceProviderRole {
    /// Creates a service provider for `authority` with its attribute consuming services.
    ///
    /// Fails when two services share an index or the defaults are ambiguous.
    pub fn new(
        authority: &Authority,
        settings: SpSettings,
        services: Vec<AttributeConsumingService>,
    ) -> FederationResult<Self> {
        let services = ServiceSet::new(services)?;
        let strategies = authority.strategies().resolve(RoleKind::ServiceProvider)?;
        let url = strategies.role_url(authority.base_url(), RoleKind::ServiceProvider);
        let relay_state =
            RelayStateManager::new(strategies.relay_store, authority.settings().relay_state_ttl);
        Ok(Self {
            authority: authority.handle(),
            settings,
            name_id_formats: strategies.name_id_formats,
            url,
            services,
            evaluators: Evaluators::new(),
            relay_state,
        })
    }

    /// Replaces the evaluators used by [`ServiceProviderRole::resolve_attributes`].
    pub fn with_evaluators(mut self, evaluators: Evaluators) -> FederationResult<Self> {
        evaluators.check(
            self.services
                .services()
                .iter()
                .flat_map(|s| &s.requested_attributes)
                .map(|r| &r.descriptor),
        )?;
        self.evaluators = evaluators;
        Ok(self)
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &SpSettings {
        &self.settings
    }

    /// Returns the RelayState manager.
    #[must_use]
    pub const fn relay_state(&self) -> &RelayStateManager {
        &self.relay_state
    }

    /// Returns the assertion consumer service URL.
    #[must_use]
    pub fn acs_url(&self) -> String {
        format!("{}/post", self.url)
    }

    /// Builds an AuthnRequest to `idp_entity_id` and records its RelayState.
    ///
    /// Returns the message to deliver and the RelayState token. The request
    /// is signed when the IdP's metadata asks for it or the SP always signs.
    pub async fn build_authn_request(
        &self,
        idp_entity_id: &str,
        relay_target: &str,
        attribute_service_index: Option<u16>,
    ) -> FederationResult<(OutboundMessage, String)> {
        let authority = self.authority.upgrade()?;
        if let Some(index) = attribute_service_index {
            self.services.resolve(Some(index))?;
        }

        let record = authority.resolve_entity(idp_entity_id).await?;
        let idp = record.descriptor.idp_sso.as_ref().ok_or_else(|| {
            TrustError::InvalidMetadata(format!("{idp_entity_id} is not an identity provider"))
        })?;
        let preferred = self.settings.request_binding;
        let (binding, endpoint) = [preferred, SamlBinding::HttpRedirect, SamlBinding::HttpPost]
            .into_iter()
            .find_map(|b| idp.sso_endpoint(b).map(|e| (b, e)))
            .ok_or_else(|| {
                TrustError::InvalidMetadata(format!(
                    "{idp_entity_id} has no HTTP-Redirect or HTTP-POST SSO endpoint"
                ))
            })?;

        let mut request = AuthnRequest::new(authority.entity_id())
            .with_destination(endpoint.location.clone())
            .with_acs_url(self.acs_url())
            .with_binding(SamlBinding::HttpPost);
        if let Some(format) = self.name_id_formats.first() {
            request = request
                .with_name_id_policy(NameIdPolicy::with_format(format.clone()).allow_create(true));
        }
        if let Some(index) = attribute_service_index {
            request = request.with_attribute_consuming_service_index(index);
        }

        let token = self
            .relay_state
            .create(&request.id, relay_target, idp_entity_id, attribute_service_index)
            .await?;
        let sign = self.settings.sign_authn_requests || idp.wants_authn_requests_signed();
        let outbound = MessageBuilder::new(authority.crypto()).authn_request(
            &request,
            binding,
            &endpoint.location,
            Some(token.clone()),
            sign,
        )?;

        tracing::info!(
            idp = %idp_entity_id,
            message_id = %request.id,
            signed = sign,
            "AuthnRequest issued"
        );
        Event::builder(EventType::AuthnRequestIssued)
            .authority(authority.entity_id())
            .peer(idp_entity_id)
            .message(&request.id)
            .build()
            .emit();
        Ok((outbound, token))
    }

    /// Validates an inbound Response and resolves the identity it asserts.
    pub async fn handle_response(&self, inbound: &InboundMessage) -> FederationResult<ResolvedIdentity> {
        self.handle_response_at(inbound, Utc::now()).await
    }

    /// Like [`ServiceProviderRole::handle_response`] at an explicit time.
    pub async fn handle_response_at(
        &self,
        inbound: &InboundMessage,
        now: DateTime<Utc>,
    ) -> FederationResult<ResolvedIdentity> {
        let authority = self.authority.upgrade()?;
        let mut seen = Seen::default();
        let result = self.check_response(&authority, inbound, now, &mut seen).await;
        match &result {
            Ok(identity) => {
                tracing::info!(
                    issuer = %identity.issuer,
                    message_id = %seen.message_id,
                    "Response accepted"
                );
                Event::builder(EventType::ResponseAccepted)
                    .authority(authority.entity_id())
                    .peer(&identity.issuer)
                    .message(&seen.message_id)
                    .build()
                    .emit();
            }
            Err(err) => {
                tracing::warn!(
                    issuer = %seen.issuer,
                    message_id = %seen.message_id,
                    error = %err,
                    "Response rejected"
                );
                Event::builder(EventType::ResponseRejected)
                    .authority(authority.entity_id())
                    .peer(&seen.issuer)
                    .message(&seen.message_id)
                    .failure(err.to_string())
                    .build()
                    .emit();
            }
        }
        result
    }

    async fn check_response(
        &self,
        authority: &Authority,
        inbound: &InboundMessage,
        now: DateTime<Utc>,
        seen: &mut Seen,
    ) -> FederationResult<ResolvedIdentity> {
        let decoded = inbound.decode().map_err(inbound_error)?;
        if decoded.message_type != SamlMessageType::Response {
            return Err(ProtocolError::MalformedMessage("expected a SAMLResponse".to_string()).into());
        }
        let root = XmlElement::parse(&decoded.xml).map_err(inbound_error)?;
        let response = Response::from_xml(&root).map_err(inbound_error)?;
        seen.issuer.clone_from(&response.issuer);
        seen.message_id.clone_from(&response.id);

        let record = authority
            .resolve_entity_at(&response.issuer, now)
            .await
            .map_err(|err| match err {
                FederationError::Trust(cause) => {
                    TrustError::UntrustedMessage(format!("issuer {}: {cause}", response.issuer)).into()
                }
                other => other,
            })?;
        if record.descriptor.idp_sso.is_none() {
            return Err(TrustError::UntrustedMessage(format!(
                "{} is not an identity provider",
                response.issuer
            ))
            .into());
        }

        let validator = MessageValidator::new(
            authority.crypto(),
            record.signing_certificates(),
            now,
            authority.settings().skew(),
        );
        validator.verify_response(&root, &response, self.settings.want_assertions_signed)?;

        if !response.is_success() {
            let code = &response.status.status_code;
            return Err(ProtocolError::UnsuccessfulStatus {
                code: code.sub_status_value().unwrap_or(&code.value).to_string(),
                message: response.status.status_message.clone(),
            }
            .into());
        }

        let assertion = response.first_assertion().ok_or_else(|| {
            ProtocolError::MalformedMessage("successful response without assertion".to_string())
        })?;
        if assertion.issuer != response.issuer {
            return Err(TrustError::UntrustedMessage(format!(
                "assertion issued by {} inside a response from {}",
                assertion.issuer, response.issuer
            ))
            .into());
        }
        validator.check_conditions(assertion)?;
        validator.check_audience(assertion, authority.entity_id(), &self.acs_url())?;

        let token = decoded
            .relay_state
            .as_deref()
            .ok_or(ProtocolError::UnknownOrReplayedResponse)?;
        let in_response_to = response
            .in_response_to
            .as_deref()
            .or_else(|| {
                assertion
                    .subject
                    .iter()
                    .flat_map(|s| &s.subject_confirmations)
                    .find_map(|c| c.subject_confirmation_data.as_ref()?.in_response_to.as_deref())
            })
            .ok_or(ProtocolError::UnknownOrReplayedResponse)?;
        let relay = self
            .relay_state
            .consume_matching_at(token, in_response_to, &response.issuer, now)
            .await
            .map_err(|err| match err {
                RelayStateError::NotFound => ProtocolError::UnknownOrReplayedResponse.into(),
                RelayStateError::IssuerMismatch { expected } => TrustError::UntrustedMessage(format!(
                    "response from {} answers a request sent to {expected}",
                    response.issuer
                ))
                .into(),
                other => FederationError::from(other),
            })?;

        let name_id = assertion
            .name_id()
            .cloned()
            .ok_or_else(|| ProtocolError::MalformedMessage("assertion without NameID".to_string()))?;
        let service = self.services.resolve(relay.attribute_service_index).ok();
        Ok(ResolvedIdentity {
            issuer: response.issuer.clone(),
            name_id,
            session_index: assertion
                .authn_statement
                .as_ref()
                .and_then(|s| s.session_index.clone()),
            authn_instant: assertion.authn_statement.as_ref().map(|s| s.authn_instant),
            attributes: map_received_attributes(service, assertion.attributes()),
            relay_target: relay.relay_target,
        })
    }

    /// Returns the attribute consuming service for `index`, or the default.
    pub fn resolve_attribute_consuming_service(
        &self,
        index: Option<u16>,
    ) -> FederationResult<&AttributeConsumingService> {
        Ok(self.services.resolve(index)?)
    }

    /// Resolves the attributes of service `index` for a local `principal`.
    pub fn resolve_attributes(
        &self,
        principal: &dyn Principal,
        index: Option<u16>,
    ) -> FederationResult<BTreeMap<String, Vec<TypedValue>>> {
        let authority = self.authority.upgrade()?;
        let service = self.services.resolve(index)?;
        Ok(resolve_attribute_values(&self.evaluators, principal, service, authority.entity_id())?
            .into_result()?)
    }

    fn sp_descriptor(&self, keys: &[KeyDescriptor]) -> SpSsoDescriptor {
        SpSsoDescriptor {
            authn_requests_signed: self.settings.sign_authn_requests.then_some(true),
            want_assertions_signed: self.settings.want_assertions_signed.then_some(true),
            key_descriptors: keys.to_vec(),
            single_logout_services: Vec::new(),
            name_id_formats: self.name_id_formats.clone(),
            assertion_consumer_services: vec![IndexedEndpoint {
                endpoint: Endpoint::new(SamlBinding::HttpPost, self.acs_url()),
                index: 1,
                is_default: Some(true),
            }],
            attribute_consuming_services: self
                .services
                .services()
                .iter()
                .map(AttributeConsumingService::to_metadata)
                .collect(),
        }
    }
}

#[derive(Default)]
struct Seen {
    issuer: String,
    message_id: String,
}

impl Role for ServiceProviderRole {
    fn kinds(&self) -> &'static [RoleKind] {
        &[RoleKind::ServiceProvider]
    }

    fn owning_authority(&self) -> &AuthorityHandle {
        &self.authority
    }

    fn name_id_formats(&self) -> &[String] {
        &self.name_id_formats
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn descriptor(&self, keys: &[KeyDescriptor]) -> RoleDescriptor {
        RoleDescriptor::Sp(self.sp_descriptor(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::attributes::{RequestedAttribute, SimplePrincipal};
    use crate::error::ConfigurationError;
    use crate::test_support::{authority, federation, Federation};
    use sf_saml::bindings::HttpPostBinding;

    async fn login(federation: &Federation) -> (OutboundMessage, String) {
        let (request, token) = federation
            .sp
            .build_authn_request(crate::test_support::IDP, "/dashboard", None)
            .await
            .unwrap();
        let validated = federation
            .idp
            .validate_authn_request(&request.to_inbound())
            .await
            .unwrap();
        let response = federation
            .idp
            .build_response(&validated, &SimplePrincipal::new("alice"))
            .unwrap();
        (response, token)
    }

    #[tokio::test]
    async fn login_round_trip() {
        let federation = federation(SpSettings::default());
        let (response, token) = login(&federation).await;
        assert_eq!(response.relay_state.as_deref(), Some(token.as_str()));

        let identity = federation.sp.handle_response(&response.to_inbound()).await.unwrap();
        assert_eq!(identity.issuer, crate::test_support::IDP);
        assert_eq!(identity.name_id.value, "alice");
        assert_eq!(identity.relay_target, "/dashboard");
        assert!(identity.session_index.is_some());
    }

    #[tokio::test]
    async fn replayed_response_is_rejected() {
        let federation = federation(SpSettings::default());
        let (response, _) = login(&federation).await;
        federation.sp.handle_response(&response.to_inbound()).await.unwrap();
        assert!(matches!(
            federation.sp.handle_response(&response.to_inbound()).await,
            Err(FederationError::Protocol(ProtocolError::UnknownOrReplayedResponse))
        ));
    }

    #[tokio::test]
    async fn tampered_response_is_untrusted() {
        let federation = federation(SpSettings::default());
        let (response, _) = login(&federation).await;
        let xml = response.to_inbound().decode().unwrap().xml.replace("alice", "mallo");
        let tampered = InboundMessage::post_response(HttpPostBinding::encode_value(&xml), response.relay_state);
        assert!(matches!(
            federation.sp.handle_response(&tampered).await,
            Err(FederationError::Trust(TrustError::UntrustedMessage(_)))
        ));
    }

    #[tokio::test]
    async fn expired_response_is_rejected() {
        let federation = federation(SpSettings::default());
        let (response, _) = login(&federation).await;
        let later = Utc::now() + chrono::Duration::seconds(3600);
        assert!(matches!(
            federation.sp.handle_response_at(&response.to_inbound(), later).await,
            Err(FederationError::Protocol(ProtocolError::ExpiredMessage(_)))
        ));
    }

    #[tokio::test]
    async fn foreign_relay_state_is_rejected() {
        let federation = federation(SpSettings::default());
        let (response, _) = login(&federation).await;
        let InboundMessage::Post { message, .. } = response.to_inbound() else {
            unreachable!("responses are posted");
        };
        let foreign = InboundMessage::post_response(message, Some("not-ours".to_string()));
        assert!(matches!(
            federation.sp.handle_response(&foreign).await,
            Err(FederationError::Protocol(ProtocolError::UnknownOrReplayedResponse))
        ));
    }

    #[tokio::test]
    async fn crossed_response_leaves_the_token_for_its_own_response() {
        let federation = federation(SpSettings::default());
        let (first, first_token) = login(&federation).await;
        let (second, _) = login(&federation).await;

        let InboundMessage::Post { message, .. } = second.to_inbound() else {
            unreachable!("responses are posted");
        };
        let crossed = InboundMessage::post_response(message, Some(first_token));
        assert!(matches!(
            federation.sp.handle_response(&crossed).await,
            Err(FederationError::Protocol(ProtocolError::UnknownOrReplayedResponse))
        ));

        let identity = federation.sp.handle_response(&first.to_inbound()).await.unwrap();
        assert_eq!(identity.relay_target, "/dashboard");
        federation.sp.handle_response(&second.to_inbound()).await.unwrap();
    }

    #[tokio::test]
    async fn signed_assertions_can_be_required() {
        let settings = SpSettings {
            want_assertions_signed: true,
            ..SpSettings::default()
        };
        let federation = federation(settings);
        let (response, _) = login(&federation).await;
        federation.sp.handle_response(&response.to_inbound()).await.unwrap();
    }

    #[tokio::test]
    async fn undefined_service_index_is_refused_locally() {
        let federation = federation(SpSettings::default());
        assert!(matches!(
            federation
                .sp
                .build_authn_request(crate::test_support::IDP, "/", Some(9))
                .await,
            Err(FederationError::Configuration(ConfigurationError::UndefinedServiceIndex(9)))
        ));
    }

    #[test]
    fn local_attribute_resolution_uses_the_default_service() {
        let authority = authority("https://sp.example.org");
        let sp = ServiceProviderRole::new(
            &authority,
            SpSettings::default(),
            vec![
                AttributeConsumingService::new(1, "basic")
                    .as_default()
                    .with_attribute(RequestedAttribute::new("mail", "mail").required()),
                AttributeConsumingService::new(2, "extended"),
            ],
        )
        .unwrap();
        let principal = SimplePrincipal::new("alice").with_property("mail", "alice@example.org");
        let values = sp.resolve_attributes(&principal, None).unwrap();
        assert_eq!(values["mail"].len(), 1);
        assert_eq!(sp.resolve_attribute_consuming_service(Some(2)).unwrap().index, 2);
        assert!(matches!(
            sp.resolve_attributes(&SimplePrincipal::new("bob"), None),
            Err(FederationError::Attributes(_))
        ));
    }

    #[test]
    fn unknown_evaluator_is_rejected() {
        let authority = authority("https://sp.example.org");
        let sp = ServiceProviderRole::new(
            &authority,
            SpSettings::default(),
            vec![AttributeConsumingService::new(1, "basic")
                .as_default()
                .with_attribute(RequestedAttribute::new("mail", "mail").with_evaluator("ldap"))],
        )
        .unwrap();
        assert!(sp.with_evaluators(Evaluators::new()).is_err());
    }

    #[test]
    fn descriptor_has_one_default_acs() {
        let authority = authority("https://sp.example.org");
        let sp = ServiceProviderRole::new(&authority, SpSettings::default(), Vec::new()).unwrap();
        let descriptor = sp.sp_descriptor(&[]);
        let acs = descriptor.default_acs().unwrap();
        assert_eq!(acs.endpoint.location, "https://sp.example.org/sp/post");
        assert_eq!(acs.index, 1);
        assert!(descriptor.attribute_consuming_services.is_empty());
    }
}
