//! Identity provider role.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sf_core::{Event, EventType};
use sf_saml::bindings::{DecodedMessage, InboundMessage, OutboundMessage, SamlMessageType};
use sf_saml::metadata::{Endpoint, IdpSsoDescriptor, KeyDescriptor, SpSsoDescriptor};
use sf_saml::signature::is_signed;
use sf_saml::xml::XmlElement;
use sf_saml::{
    Assertion, AuthnContextClass, AuthnRequest, AuthnStatement, Conditions, NameId, NameIdFormat,
    Response, SamlBinding, Status, StatusCode, Subject, SubjectConfirmation,
    SubjectConfirmationData,
};

use super::{Role, RoleDescriptor, RoleKind};
use crate::attributes::{AttributeProvider, Principal, ReleasePolicy};
use crate::authority::{Authority, AuthorityHandle};
use crate::error::{
    ConfigurationError, FederationError, FederationResult, ProtocolError, TrustError,
};
use crate::message::{inbound_error, MessageBuilder, MessageValidator};

/// Identity provider settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdpSettings {
    /// Require every AuthnRequest to be signed.
    pub want_authn_requests_signed: bool,
    /// Sign assertions even when the SP does not ask for it.
    pub sign_assertions: bool,
    /// Lifetime of issued assertions.
    pub assertion_validity: Duration,
    /// What to do when requested attributes cannot all be released.
    pub release_policy: ReleasePolicy,
}

impl Default for IdpSettings {
    fn default() -> Self {
        Self {
            want_authn_requests_signed: false,
            sign_assertions: false,
            assertion_validity: Duration::from_secs(300),
            release_policy: ReleasePolicy::default(),
        }
    }
}

/// An AuthnRequest that passed validation, with what answering it needs.
#[derive(Debug, Clone)]
pub struct ValidatedAuthnRequest {
    /// The request.
    pub request: AuthnRequest,
    /// Entity ID of the requesting SP.
    pub sp_entity_id: String,
    /// The SP's metadata at validation time.
    pub sp: SpSsoDescriptor,
    /// Where the Response goes.
    pub acs_url: String,
    /// RelayState to echo back.
    pub relay_state: Option<String>,
}

/// The identity provider role.
#[derive(Debug)]
pub struct IdentityProviderRole {
    authority: AuthorityHandle,
    settings: IdpSettings,
    name_id_formats: Vec<String>,
    url: String,
    release: Option<AttributeProvider>,
    kinds: &'static [RoleKind],
}

impl IdentityProviderRole {
    /// Creates an identity provider for `authority`.
    ///
    /// The role is inert until registered with the authority.
    pub fn new(authority: &Authority, settings: IdpSettings) -> FederationResult<Self> {
        Self::build(authority, settings, None, &[RoleKind::IdentityProvider])
    }

    pub(super) fn build(
        authority: &Authority,
        settings: IdpSettings,
        release: Option<AttributeProvider>,
        kinds: &'static [RoleKind],
    ) -> FederationResult<Self> {
        let strategies = authority.strategies().resolve(RoleKind::IdentityProvider)?;
        let url = strategies.role_url(authority.base_url(), RoleKind::IdentityProvider);
        Ok(Self {
            authority: authority.handle(),
            settings,
            name_id_formats: strategies.name_id_formats,
            url,
            release,
            kinds,
        })
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &IdpSettings {
        &self.settings
    }

    /// Returns the attribute provider, when attributes are released.
    #[must_use]
    pub const fn attribute_provider(&self) -> Option<&AttributeProvider> {
        self.release.as_ref()
    }

    fn sso_urls(&self) -> [String; 2] {
        [format!("{}/redirect", self.url), format!("{}/post", self.url)]
    }

    /// Validates an inbound AuthnRequest.
    pub async fn validate_authn_request(
        &self,
        inbound: &InboundMessage,
    ) -> FederationResult<ValidatedAuthnRequest> {
        self.validate_authn_request_at(inbound, Utc::now()).await
    }

    /// Like [`IdentityProviderRole::validate_authn_request`] at an explicit time.
    pub async fn validate_authn_request_at(
        &self,
        inbound: &InboundMessage,
        now: DateTime<Utc>,
    ) -> FederationResult<ValidatedAuthnRequest> {
        let authority = self.authority.upgrade()?;
        let result = match parse_request(inbound) {
            Ok((decoded, root, request)) => {
                self.check_request(&authority, &decoded, &root, request, now)
                    .await
            }
            Err(err) => Err(err),
        };
        match &result {
            Ok(validated) => {
                tracing::info!(
                    issuer = %validated.sp_entity_id,
                    message_id = %validated.request.id,
                    "AuthnRequest accepted"
                );
                Event::builder(EventType::AuthnRequestAccepted)
                    .authority(authority.entity_id())
                    .peer(&validated.sp_entity_id)
                    .message(&validated.request.id)
                    .build()
                    .emit();
            }
            Err(err) => {
                tracing::warn!(error = %err, binding = ?inbound.binding(), "AuthnRequest rejected");
                Event::builder(EventType::AuthnRequestRejected)
                    .authority(authority.entity_id())
                    .failure(err.to_string())
                    .build()
                    .emit();
            }
        }
        result
    }

    async fn check_request(
        &self,
        authority: &Authority,
        decoded: &DecodedMessage,
        root: &XmlElement,
        request: AuthnRequest,
        now: DateTime<Utc>,
    ) -> FederationResult<ValidatedAuthnRequest> {
        let record = authority.resolve_entity_at(&request.issuer, now).await?;
        let sp = record.descriptor.sp_sso.clone().ok_or_else(|| {
            ProtocolError::InvalidRequest(format!("{} is not a service provider", request.issuer))
        })?;

        let settings = authority.settings();
        let validator = MessageValidator::new(
            authority.crypto(),
            record.signing_certificates(),
            now,
            settings.skew(),
        );
        if decoded.signature.is_some() {
            validator.verify_redirect(decoded)?;
        } else if is_signed(root) {
            validator.verify_element(root, &request.id)?;
        } else if self.settings.want_authn_requests_signed || sp.signs_authn_requests() {
            return Err(TrustError::UntrustedMessage(format!(
                "AuthnRequest {} must be signed",
                request.id
            ))
            .into());
        }

        let max_age = chrono::Duration::from_std(settings.relay_state_ttl)
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
        validator.check_issue_instant(request.issue_instant, max_age)?;

        if let Some(destination) = &request.destination {
            if !self.sso_urls().contains(destination) {
                return Err(ProtocolError::InvalidRequest(format!(
                    "destination {destination} is not an SSO endpoint"
                ))
                .into());
            }
        }
        if let Some(binding) = &request.protocol_binding {
            if binding != SamlBinding::HttpPost.uri() {
                return Err(
                    ProtocolError::InvalidRequest(format!("unsupported response binding {binding}"))
                        .into(),
                );
            }
        }

        let acs = match (
            &request.assertion_consumer_service_url,
            request.assertion_consumer_service_index,
        ) {
            (Some(url), _) => sp.acs_by_location(url).ok_or_else(|| {
                ProtocolError::InvalidRequest(format!("{url} is not an assertion consumer service"))
            })?,
            (None, Some(index)) => sp.acs_by_index(index).ok_or_else(|| {
                ProtocolError::InvalidRequest(format!(
                    "assertion consumer service {index} is not defined"
                ))
            })?,
            (None, None) => sp.default_acs().ok_or_else(|| {
                ProtocolError::InvalidRequest("no assertion consumer service".to_string())
            })?,
        };
        if acs.endpoint.binding != SamlBinding::HttpPost.uri() {
            return Err(ProtocolError::InvalidRequest(format!(
                "assertion consumer service {} does not accept HTTP-POST",
                acs.endpoint.location
            ))
            .into());
        }
        let acs_url = acs.endpoint.location.clone();

        Ok(ValidatedAuthnRequest {
            sp_entity_id: request.issuer.clone(),
            request,
            sp,
            acs_url,
            relay_state: decoded.relay_state.clone(),
        })
    }

    /// Answers a validated request for an authenticated `principal`.
    ///
    /// An unsupported name ID format or an undefined attribute consuming
    /// service index yields an error Response rather than an `Err`.
    pub fn build_response(
        &self,
        validated: &ValidatedAuthnRequest,
        principal: &dyn Principal,
    ) -> FederationResult<OutboundMessage> {
        self.build_response_at(validated, principal, Utc::now())
    }

    /// Like [`IdentityProviderRole::build_response`] at an explicit time.
    pub fn build_response_at(
        &self,
        validated: &ValidatedAuthnRequest,
        principal: &dyn Principal,
        now: DateTime<Utc>,
    ) -> FederationResult<OutboundMessage> {
        self.build_response_with_policy_at(validated, principal, self.settings.release_policy, now)
    }

    /// Like [`IdentityProviderRole::build_response`], deciding per exchange
    /// whether an incomplete attribute release fails it.
    pub fn build_response_with_policy(
        &self,
        validated: &ValidatedAuthnRequest,
        principal: &dyn Principal,
        policy: ReleasePolicy,
    ) -> FederationResult<OutboundMessage> {
        self.build_response_with_policy_at(validated, principal, policy, Utc::now())
    }

    /// Like [`IdentityProviderRole::build_response_with_policy`] at an
    /// explicit time.
    pub fn build_response_with_policy_at(
        &self,
        validated: &ValidatedAuthnRequest,
        principal: &dyn Principal,
        policy: ReleasePolicy,
        now: DateTime<Utc>,
    ) -> FederationResult<OutboundMessage> {
        let authority = self.authority.upgrade()?;
        let assertion = match self.assertion(&authority, validated, principal, policy, now) {
            Ok(assertion) => assertion,
            Err(
                err @ (FederationError::Protocol(ProtocolError::InvalidNameIdPolicy(_))
                | FederationError::Configuration(ConfigurationError::UndefinedServiceIndex(_))),
            ) => {
                tracing::warn!(
                    requester = %validated.sp_entity_id,
                    message_id = %validated.request.id,
                    error = %err,
                    "answering with an error status"
                );
                return self.error_response_at(validated, &err, now);
            }
            Err(err) => return Err(err),
        };

        let response = Response::success(authority.entity_id())
            .issued_at(now)
            .in_response_to(validated.request.id.clone())
            .with_destination(validated.acs_url.clone())
            .with_assertion(assertion);
        let sign_assertions = self.settings.sign_assertions || validated.sp.wants_assertions_signed();
        let outbound = MessageBuilder::new(authority.crypto()).response(
            &response,
            sign_assertions,
            validated.relay_state.clone(),
        )?;

        tracing::info!(
            requester = %validated.sp_entity_id,
            message_id = %response.id,
            in_response_to = %validated.request.id,
            "Response issued"
        );
        Event::builder(EventType::ResponseIssued)
            .authority(authority.entity_id())
            .peer(&validated.sp_entity_id)
            .message(&response.id)
            .build()
            .emit();
        Ok(outbound)
    }

    fn assertion(
        &self,
        authority: &Authority,
        validated: &ValidatedAuthnRequest,
        principal: &dyn Principal,
        policy: ReleasePolicy,
        now: DateTime<Utc>,
    ) -> FederationResult<Assertion> {
        let request = &validated.request;
        let format = self.name_id_format(request)?;
        let name_id = if format == NameIdFormat::Transient.uri() {
            NameId::with_format_uri(sf_crypto::random::generate_transient_id(), format)
        } else if format == NameIdFormat::Persistent.uri() {
            NameId::with_format_uri(principal.identifier(), format)
                .with_name_qualifier(authority.entity_id())
                .with_sp_name_qualifier(validated.sp_entity_id.clone())
        } else {
            NameId::with_format_uri(principal.identifier(), format)
        };

        let validity = chrono::Duration::from_std(self.settings.assertion_validity)
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
        let confirmation = SubjectConfirmation::bearer().with_data(SubjectConfirmationData::for_request(
            Some(request.id.clone()),
            validated.acs_url.clone(),
            now + validity,
        ));
        let mut assertion = Assertion::new(authority.entity_id())
            .issued_at(now)
            .with_subject(Subject::new(name_id).with_confirmation(confirmation))
            .with_conditions(
                Conditions::valid_for(now, validity).with_audience(validated.sp_entity_id.clone()),
            )
            .with_authn_statement(AuthnStatement::new(
                principal.authn_instant().unwrap_or(now),
                AuthnContextClass::Unspecified,
            ));

        if let Some(provider) = &self.release {
            let service = AttributeProvider::select_service(
                &validated.sp,
                request.attribute_consuming_service_index,
            )?;
            if let Some(service) = service {
                let release = provider.build_statement(principal, service, &validated.sp_entity_id)?;
                if !release.is_complete() {
                    tracing::warn!(
                        requester = %validated.sp_entity_id,
                        service_index = service.index,
                        errors = %release.errors,
                        policy = ?policy,
                        "incomplete attribute release"
                    );
                }
                if let Some(statement) = release.apply(policy)? {
                    assertion = assertion.with_attribute_statement(statement);
                }
            }
        }
        Ok(assertion)
    }

    fn name_id_format(&self, request: &AuthnRequest) -> FederationResult<String> {
        let requested = request
            .name_id_policy
            .as_ref()
            .and_then(|policy| policy.format.as_deref())
            .filter(|format| *format != NameIdFormat::Unspecified.uri());
        match requested {
            Some(format) if self.name_id_formats.iter().any(|f| f == format) => Ok(format.to_string()),
            Some(format) => Err(ProtocolError::InvalidNameIdPolicy(format.to_string()).into()),
            None => Ok(self
                .name_id_formats
                .first()
                .cloned()
                .unwrap_or_else(|| NameIdFormat::Unspecified.uri().to_string())),
        }
    }

    /// Answers a validated request with an error status derived from `error`.
    pub fn error_response(
        &self,
        validated: &ValidatedAuthnRequest,
        error: &FederationError,
    ) -> FederationResult<OutboundMessage> {
        self.error_response_at(validated, error, Utc::now())
    }

    fn error_response_at(
        &self,
        validated: &ValidatedAuthnRequest,
        error: &FederationError,
        now: DateTime<Utc>,
    ) -> FederationResult<OutboundMessage> {
        let authority = self.authority.upgrade()?;
        let status = match error.sub_status_code() {
            Some(sub) => Status::error(error.status_code(), sub, error.to_string()),
            None => Status {
                status_code: StatusCode::new(error.status_code()),
                status_message: Some(error.to_string()),
            },
        };
        let response = Response::error(authority.entity_id(), status)
            .issued_at(now)
            .in_response_to(validated.request.id.clone())
            .with_destination(validated.acs_url.clone());
        MessageBuilder::new(authority.crypto()).response(
            &response,
            false,
            validated.relay_state.clone(),
        )
    }

    pub(super) fn idp_descriptor(&self, keys: &[KeyDescriptor]) -> IdpSsoDescriptor {
        let [redirect, post] = self.sso_urls();
        IdpSsoDescriptor {
            want_authn_requests_signed: self.settings.want_authn_requests_signed.then_some(true),
            key_descriptors: keys.to_vec(),
            single_logout_services: Vec::new(),
            name_id_formats: self.name_id_formats.clone(),
            single_sign_on_services: vec![
                Endpoint::new(SamlBinding::HttpRedirect, redirect),
                Endpoint::new(SamlBinding::HttpPost, post),
            ],
            attributes: self
                .release
                .as_ref()
                .map(AttributeProvider::metadata_attributes)
                .unwrap_or_default(),
        }
    }
}

fn parse_request(
    inbound: &InboundMessage,
) -> FederationResult<(DecodedMessage, XmlElement, AuthnRequest)> {
    let decoded = inbound.decode().map_err(inbound_error)?;
    if decoded.message_type != SamlMessageType::Request {
        return Err(ProtocolError::MalformedMessage("expected a SAMLRequest".to_string()).into());
    }
    let root = XmlElement::parse(&decoded.xml).map_err(inbound_error)?;
    let request = AuthnRequest::from_xml(&root).map_err(inbound_error)?;
    Ok((decoded, root, request))
}

impl Role for IdentityProviderRole {
    fn kinds(&self) -> &'static [RoleKind] {
        self.kinds
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
        RoleDescriptor::Idp(self.idp_descriptor(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::attributes::SimplePrincipal;
    use crate::test_support::{authority, sp_metadata};
    use sf_saml::{status_codes, sub_status_codes, NameIdPolicy, SAML_NS};

    const IDP: &str = "https://idp.example.org";
    const SP: &str = "https://sp.example.org";
    const ACS: &str = "https://sp.example.org/sp/post";

    fn setup(settings: IdpSettings) -> (Authority, Arc<IdentityProviderRole>) {
        let authority = authority(IDP);
        let role = Arc::new(IdentityProviderRole::new(&authority, settings).unwrap());
        authority.register_role(role.clone()).unwrap();
        authority.upsert_entity(&sp_metadata(SP, None)).unwrap();
        (authority, role)
    }

    fn request() -> AuthnRequest {
        AuthnRequest::new(SP)
            .with_destination("https://idp.example.org/idp/redirect")
            .with_binding(SamlBinding::HttpPost)
    }

    fn redirect(request: &AuthnRequest) -> InboundMessage {
        let crypto = crate::test_support::capability("sp.example.org");
        MessageBuilder::new(&crypto)
            .authn_request(
                request,
                SamlBinding::HttpRedirect,
                "https://idp.example.org/idp/redirect",
                Some("relay".to_string()),
                false,
            )
            .unwrap()
            .to_inbound()
    }

    #[tokio::test]
    async fn unsigned_request_is_accepted_when_allowed() {
        let (_authority, idp) = setup(IdpSettings::default());
        let validated = idp.validate_authn_request(&redirect(&request())).await.unwrap();
        assert_eq!(validated.sp_entity_id, SP);
        assert_eq!(validated.acs_url, ACS);
        assert_eq!(validated.relay_state.as_deref(), Some("relay"));
    }

    #[tokio::test]
    async fn unsigned_request_is_rejected_when_signatures_are_wanted() {
        let settings = IdpSettings {
            want_authn_requests_signed: true,
            ..IdpSettings::default()
        };
        let (_authority, idp) = setup(settings);
        assert!(matches!(
            idp.validate_authn_request(&redirect(&request())).await,
            Err(FederationError::Trust(TrustError::UntrustedMessage(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_sp_is_rejected() {
        let (_authority, idp) = setup(IdpSettings::default());
        let request = AuthnRequest::new("https://unknown.example.org");
        assert!(matches!(
            idp.validate_authn_request(&redirect(&request)).await,
            Err(FederationError::Trust(TrustError::UnknownEntity(_)))
        ));
    }

    #[tokio::test]
    async fn wrong_destination_is_rejected() {
        let (_authority, idp) = setup(IdpSettings::default());
        let request = AuthnRequest::new(SP).with_destination("https://idp.example.org/elsewhere");
        assert!(matches!(
            idp.validate_authn_request(&redirect(&request)).await,
            Err(FederationError::Protocol(ProtocolError::InvalidRequest(_)))
        ));
    }

    #[tokio::test]
    async fn unregistered_acs_url_is_rejected() {
        let (_authority, idp) = setup(IdpSettings::default());
        let request = request().with_acs_url("https://attacker.example.org/acs");
        assert!(matches!(
            idp.validate_authn_request(&redirect(&request)).await,
            Err(FederationError::Protocol(ProtocolError::InvalidRequest(_)))
        ));
    }

    #[tokio::test]
    async fn old_request_is_expired() {
        let (_authority, idp) = setup(IdpSettings::default());
        let later = Utc::now() + chrono::Duration::seconds(3600);
        assert!(matches!(
            idp.validate_authn_request_at(&redirect(&request()), later).await,
            Err(FederationError::Protocol(ProtocolError::ExpiredMessage(_)))
        ));
    }

    #[tokio::test]
    async fn response_carries_a_persistent_name_id() {
        let (_authority, idp) = setup(IdpSettings::default());
        let validated = idp.validate_authn_request(&redirect(&request())).await.unwrap();
        let outbound = idp
            .build_response(&validated, &SimplePrincipal::new("alice"))
            .unwrap();
        assert_eq!(outbound.destination, ACS);

        let xml = outbound.to_inbound().decode().unwrap().xml;
        let response = Response::from_xml(&XmlElement::parse(&xml).unwrap()).unwrap();
        assert!(response.is_success());
        assert_eq!(response.in_response_to.as_deref(), Some(validated.request.id.as_str()));
        let name_id = response.first_assertion().unwrap().name_id().unwrap();
        assert_eq!(name_id.value, "alice");
        assert_eq!(name_id.format_uri(), NameIdFormat::Persistent.uri());
        assert_eq!(name_id.sp_name_qualifier.as_deref(), Some(SP));
    }

    #[tokio::test]
    async fn transient_name_ids_are_fresh() {
        let (_authority, idp) = setup(IdpSettings::default());
        let request = request().with_name_id_policy(NameIdPolicy::with_format(NameIdFormat::Transient.uri()));
        let validated = idp.validate_authn_request(&redirect(&request)).await.unwrap();

        let mut values = Vec::new();
        for _ in 0..2 {
            let outbound = idp
                .build_response(&validated, &SimplePrincipal::new("alice"))
                .unwrap();
            let xml = outbound.to_inbound().decode().unwrap().xml;
            let response = Response::from_xml(&XmlElement::parse(&xml).unwrap()).unwrap();
            values.push(response.first_assertion().unwrap().name_id().unwrap().value.clone());
        }
        assert_ne!(values[0], "alice");
        assert_ne!(values[0], values[1]);
    }

    #[tokio::test]
    async fn unsupported_format_yields_error_status() {
        let (_authority, idp) = setup(IdpSettings::default());
        let request = request().with_name_id_policy(NameIdPolicy::with_format(NameIdFormat::Email.uri()));
        let validated = idp.validate_authn_request(&redirect(&request)).await.unwrap();
        let outbound = idp
            .build_response(&validated, &SimplePrincipal::new("alice"))
            .unwrap();

        let xml = outbound.to_inbound().decode().unwrap().xml;
        let root = XmlElement::parse(&xml).unwrap();
        assert!(root.child(SAML_NS, "Assertion").is_none());
        let response = Response::from_xml(&root).unwrap();
        assert_eq!(response.status.status_code.value, status_codes::REQUESTER);
        assert_eq!(
            response.status.status_code.sub_status_value(),
            Some(sub_status_codes::INVALID_NAMEID_POLICY)
        );
    }

    #[test]
    fn descriptor_lists_both_sso_bindings() {
        let authority = authority(IDP);
        let idp = IdentityProviderRole::new(&authority, IdpSettings::default()).unwrap();
        let descriptor = idp.idp_descriptor(&[]);
        assert_eq!(
            descriptor.sso_endpoint(SamlBinding::HttpPost).unwrap().location,
            "https://idp.example.org/idp/post"
        );
        assert!(descriptor.want_authn_requests_signed.is_none());
        assert_eq!(descriptor.name_id_formats.len(), 3);
    }
}
