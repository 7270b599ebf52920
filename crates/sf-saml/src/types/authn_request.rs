//! SAML AuthnRequest types.
//!
//! Authentication request message sent by a service provider to an identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{issuer_element, read_issuer, NameIdPolicy, SamlBinding, SAMLP_NS, SAML_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::{format_instant, opt_bool, opt_u16, parse_instant, XmlElement};

/// SAML Authentication Request.
///
/// An authentication request message sent from a service provider to an
/// identity provider requesting authentication of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The URL where the response should be sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Index into the SP's assertion consumer service list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_index: Option<u16>,

    /// The IdP endpoint the request was sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Binding to use for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,

    /// Name ID policy constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_policy: Option<NameIdPolicy>,

    /// Whether the IdP must authenticate the user directly.
    #[serde(default)]
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,

    /// Index into the SP's attribute consuming service list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_consuming_service_index: Option<u16>,

    /// A human-readable name for the requester.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl AuthnRequest {
    /// Creates a new authentication request.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: default_version(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            assertion_consumer_service_url: None,
            assertion_consumer_service_index: None,
            destination: None,
            protocol_binding: None,
            name_id_policy: None,
            force_authn: false,
            is_passive: false,
            attribute_consuming_service_index: None,
            provider_name: None,
        }
    }

    /// Creates a new authentication request with a custom ID.
    #[must_use]
    pub fn with_id(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(issuer)
        }
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the assertion consumer service index.
    #[must_use]
    pub const fn with_acs_index(mut self, index: u16) -> Self {
        self.assertion_consumer_service_index = Some(index);
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the protocol binding for the response.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    /// Sets the attribute consuming service index.
    #[must_use]
    pub const fn with_attribute_consuming_service_index(mut self, index: u16) -> Self {
        self.attribute_consuming_service_index = Some(index);
        self
    }

    /// Sets force authentication.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets passive authentication.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Returns the parsed protocol binding.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        self.protocol_binding.as_deref().and_then(SamlBinding::from_uri)
    }

    /// Validates the basic structure of this request.
    pub fn validate(&self) -> SamlResult<()> {
        if self.id.is_empty() {
            return Err(SamlError::MissingElement("AuthnRequest@ID".to_string()));
        }
        if self.version != "2.0" {
            return Err(SamlError::InvalidValue(format!(
                "unsupported SAML version: {}",
                self.version
            )));
        }
        if self.issuer.is_empty() {
            return Err(SamlError::MissingElement("Issuer".to_string()));
        }
        Ok(())
    }

    /// Builds the `samlp:AuthnRequest` document element.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        XmlElement::new("samlp:AuthnRequest", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", self.version.clone())
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_opt_attr("Destination", self.destination.clone())
            .with_opt_attr("ProviderName", self.provider_name.clone())
            .with_opt_attr("ForceAuthn", self.force_authn.then_some("true"))
            .with_opt_attr("IsPassive", self.is_passive.then_some("true"))
            .with_opt_attr("ProtocolBinding", self.protocol_binding.clone())
            .with_opt_attr(
                "AssertionConsumerServiceIndex",
                self.assertion_consumer_service_index.map(|i| i.to_string()),
            )
            .with_opt_attr(
                "AssertionConsumerServiceURL",
                self.assertion_consumer_service_url.clone(),
            )
            .with_opt_attr(
                "AttributeConsumingServiceIndex",
                self.attribute_consuming_service_index.map(|i| i.to_string()),
            )
            .with_child(issuer_element(&self.issuer))
            .with_opt_child(self.name_id_policy.as_ref().map(NameIdPolicy::to_xml))
    }

    /// Reads a `samlp:AuthnRequest` element.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        if !element.is(SAMLP_NS, "AuthnRequest") {
            return Err(SamlError::UnexpectedMessage {
                expected: "AuthnRequest",
                actual: element.qname(),
            });
        }

        let request = Self {
            id: element.required_attr("ID")?.to_string(),
            version: element.required_attr("Version")?.to_string(),
            issue_instant: parse_instant(element.required_attr("IssueInstant")?)?,
            issuer: read_issuer(element)?,
            assertion_consumer_service_url: element
                .attr("AssertionConsumerServiceURL")
                .map(String::from),
            assertion_consumer_service_index: opt_u16(element, "AssertionConsumerServiceIndex")?,
            destination: element.attr("Destination").map(String::from),
            protocol_binding: element.attr("ProtocolBinding").map(String::from),
            name_id_policy: element
                .child(SAMLP_NS, "NameIDPolicy")
                .map(NameIdPolicy::from_xml)
                .transpose()?,
            force_authn: opt_bool(element, "ForceAuthn")?.unwrap_or(false),
            is_passive: opt_bool(element, "IsPassive")?.unwrap_or(false),
            attribute_consuming_service_index: opt_u16(element, "AttributeConsumingServiceIndex")?,
            provider_name: element.attr("ProviderName").map(String::from),
        };
        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameIdFormat;

    #[test]
    fn authn_request_new() {
        let request = AuthnRequest::new("https://sp.example.org");
        assert!(request.id.starts_with("_id"));
        assert_eq!(request.version, "2.0");
        assert_eq!(request.issuer, "https://sp.example.org");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn authn_request_xml() {
        let request = AuthnRequest::new("https://sp.example.org")
            .with_destination("https://idp.example.org/idp/redirect")
            .with_acs_url("https://sp.example.org/sp/post")
            .with_binding(SamlBinding::HttpPost)
            .with_attribute_consuming_service_index(2)
            .with_name_id_policy(NameIdPolicy::with_format(NameIdFormat::Persistent.uri()));

        let xml = request.to_xml().to_document();
        let parsed = AuthnRequest::from_xml(&XmlElement::parse(&xml).unwrap()).unwrap();

        // The wire format has second precision.
        assert_eq!(parsed.id, request.id);
        assert_eq!(parsed.attribute_consuming_service_index, Some(2));
        assert_eq!(parsed.parsed_binding(), Some(SamlBinding::HttpPost));
        assert_eq!(parsed.name_id_policy, request.name_id_policy);
        assert_eq!(parsed.destination, request.destination);
    }

    #[test]
    fn wrong_root_is_rejected() {
        let element = XmlElement::new("samlp:Response", SAMLP_NS);
        assert!(matches!(
            AuthnRequest::from_xml(&element),
            Err(SamlError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut request = AuthnRequest::new("https://sp.example.org");
        request.version = "1.1".to_string();
        let element = request.to_xml();
        assert!(AuthnRequest::from_xml(&element).is_err());
    }

    #[test]
    fn missing_issuer_is_rejected() {
        let mut element = AuthnRequest::new("https://sp.example.org").to_xml();
        element.remove_children(SAML_NS, "Issuer");
        assert!(matches!(
            AuthnRequest::from_xml(&element),
            Err(SamlError::MissingElement(_))
        ));
    }
}
