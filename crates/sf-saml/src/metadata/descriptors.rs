//! Role descriptors and their building blocks.

use serde::{Deserialize, Serialize};
use sf_crypto::Certificate;

use crate::error::{SamlError, SamlResult};
use crate::types::{Attribute, SamlBinding, METADATA_NS, SAMLP_NS, SAML_NS, XMLDSIG_NS};
use crate::xml::{opt_bool, opt_u16, XmlElement};

/// What a published key may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    /// Signature creation and verification.
    Signing,
    /// Encryption.
    Encryption,
}

impl KeyUse {
    /// Returns the value of the `use` attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signing => "signing",
            Self::Encryption => "encryption",
        }
    }
}

/// A `md:KeyDescriptor` carrying one X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    /// Key usage; `None` means the key serves every purpose.
    pub usage: Option<KeyUse>,
    /// The certificate.
    pub certificate: Certificate,
}

impl KeyDescriptor {
    /// Creates a signing key descriptor.
    #[must_use]
    pub fn signing(certificate: Certificate) -> Self {
        Self {
            usage: Some(KeyUse::Signing),
            certificate,
        }
    }

    /// Returns whether the key may be used to verify signatures.
    #[must_use]
    pub fn is_signing(&self) -> bool {
        matches!(self.usage, None | Some(KeyUse::Signing))
    }

    fn to_xml(&self) -> XmlElement {
        XmlElement::new("md:KeyDescriptor", METADATA_NS)
            .with_opt_attr("use", self.usage.map(KeyUse::as_str))
            .with_child(
                XmlElement::new("ds:KeyInfo", XMLDSIG_NS).with_child(
                    XmlElement::new("ds:X509Data", XMLDSIG_NS).with_child(
                        XmlElement::new("ds:X509Certificate", XMLDSIG_NS)
                            .with_text(self.certificate.to_base64()),
                    ),
                ),
            )
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        let usage = match element.attr("use") {
            None => None,
            Some("signing") => Some(KeyUse::Signing),
            Some("encryption") => Some(KeyUse::Encryption),
            Some(other) => {
                return Err(SamlError::InvalidMetadata(format!(
                    "unknown KeyDescriptor use '{other}'"
                )))
            }
        };
        let value = element
            .required_child(XMLDSIG_NS, "KeyInfo")?
            .required_child(XMLDSIG_NS, "X509Data")?
            .child_text(XMLDSIG_NS, "X509Certificate")
            .ok_or_else(|| SamlError::InvalidMetadata("KeyDescriptor without certificate".to_string()))?;
        let certificate = Certificate::from_base64(&value)
            .map_err(|e| SamlError::InvalidMetadata(format!("KeyDescriptor certificate: {e}")))?;
        Ok(Self { usage, certificate })
    }
}

/// A protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Binding URI.
    pub binding: String,
    /// Endpoint URL.
    pub location: String,
    /// Optional separate location for responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_location: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint for `binding` at `location`.
    #[must_use]
    pub fn new(binding: SamlBinding, location: impl Into<String>) -> Self {
        Self {
            binding: binding.uri().to_string(),
            location: location.into(),
            response_location: None,
        }
    }

    /// Returns the parsed binding, if known.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_uri(&self.binding)
    }

    fn to_xml(&self, qname: &str) -> XmlElement {
        XmlElement::new(qname, METADATA_NS)
            .with_attr("Binding", self.binding.clone())
            .with_attr("Location", self.location.clone())
            .with_opt_attr("ResponseLocation", self.response_location.clone())
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            binding: element.required_attr("Binding")?.to_string(),
            location: element.required_attr("Location")?.to_string(),
            response_location: element.attr("ResponseLocation").map(String::from),
        })
    }
}

/// An endpoint with an index, such as an `AssertionConsumerService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEndpoint {
    /// The endpoint.
    #[serde(flatten)]
    pub endpoint: Endpoint,
    /// Index, unique within the descriptor.
    pub index: u16,
    /// The `isDefault` attribute as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl IndexedEndpoint {
    fn to_xml(&self, qname: &str) -> XmlElement {
        self.endpoint
            .to_xml(qname)
            .with_attr("index", self.index.to_string())
            .with_opt_attr("isDefault", self.is_default.map(|d| d.to_string()))
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            endpoint: Endpoint::from_xml(element)?,
            index: opt_u16(element, "index")?
                .ok_or_else(|| SamlError::MissingElement(format!("{}@index", element.qname())))?,
            is_default: opt_bool(element, "isDefault")?,
        })
    }
}

/// Anything with an `isDefault` flag, for default selection.
pub trait Defaultable {
    /// The `isDefault` attribute as written.
    fn is_default(&self) -> Option<bool>;
}

impl Defaultable for IndexedEndpoint {
    fn is_default(&self) -> Option<bool> {
        self.is_default
    }
}

/// Selects the default among indexed items.
///
/// The first item with `isDefault="true"` wins, then the first without an
/// `isDefault` attribute, then the first item.
pub fn select_default<T: Defaultable>(items: &[T]) -> Option<&T> {
    items
        .iter()
        .find(|i| i.is_default() == Some(true))
        .or_else(|| items.iter().find(|i| i.is_default().is_none()))
        .or_else(|| items.first())
}

/// A `md:RequestedAttribute` inside an attribute consuming service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAttributeDescriptor {
    /// SAML attribute name.
    pub name: String,
    /// Name format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,
    /// Friendly name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    /// The `isRequired` attribute as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,
}

impl RequestedAttributeDescriptor {
    /// Returns the name format, defaulting to `unspecified`.
    #[must_use]
    pub fn effective_name_format(&self) -> &str {
        self.name_format
            .as_deref()
            .unwrap_or(crate::types::attrname_formats::UNSPECIFIED)
    }
}

/// A localized service name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedName {
    /// `xml:lang` value.
    pub lang: String,
    /// The name.
    pub value: String,
}

/// A `md:AttributeConsumingService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConsumingServiceDescriptor {
    /// Index, unique within the SP.
    pub index: u16,
    /// The `isDefault` attribute as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    /// Service names.
    pub service_names: Vec<LocalizedName>,
    /// Requested attributes in document order.
    pub requested_attributes: Vec<RequestedAttributeDescriptor>,
}

impl Defaultable for AttributeConsumingServiceDescriptor {
    fn is_default(&self) -> Option<bool> {
        self.is_default
    }
}

impl AttributeConsumingServiceDescriptor {
    fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("md:AttributeConsumingService", METADATA_NS)
            .with_attr("index", self.index.to_string())
            .with_opt_attr("isDefault", self.is_default.map(|d| d.to_string()));
        for name in &self.service_names {
            element = element.with_child(
                XmlElement::new("md:ServiceName", METADATA_NS)
                    .with_attr("xml:lang", name.lang.clone())
                    .with_text(name.value.clone()),
            );
        }
        for requested in &self.requested_attributes {
            element = element.with_child(
                XmlElement::new("md:RequestedAttribute", METADATA_NS)
                    .with_attr("Name", requested.name.clone())
                    .with_opt_attr("NameFormat", requested.name_format.clone())
                    .with_opt_attr("FriendlyName", requested.friendly_name.clone())
                    .with_opt_attr("isRequired", requested.is_required.map(|r| r.to_string())),
            );
        }
        element
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            index: opt_u16(element, "index")?.ok_or_else(|| {
                SamlError::MissingElement("AttributeConsumingService@index".to_string())
            })?,
            is_default: opt_bool(element, "isDefault")?,
            service_names: element
                .children_named(METADATA_NS, "ServiceName")
                .map(|name| LocalizedName {
                    lang: name.attr("xml:lang").unwrap_or("en").to_string(),
                    value: name.text().trim().to_string(),
                })
                .collect(),
            requested_attributes: element
                .children_named(METADATA_NS, "RequestedAttribute")
                .map(|requested| -> SamlResult<_> {
                    Ok(RequestedAttributeDescriptor {
                        name: requested.required_attr("Name")?.to_string(),
                        name_format: requested.attr("NameFormat").map(String::from),
                        friendly_name: requested.attr("FriendlyName").map(String::from),
                        is_required: opt_bool(requested, "isRequired")?,
                    })
                })
                .collect::<SamlResult<_>>()?,
        })
    }
}

/// Returns whether a `protocolSupportEnumeration` lists SAML 2.0.
fn supports_saml2(element: &XmlElement) -> bool {
    element
        .attr("protocolSupportEnumeration")
        .is_some_and(|list| list.split_whitespace().any(|p| p == SAMLP_NS))
}

fn key_descriptors(element: &XmlElement) -> SamlResult<Vec<KeyDescriptor>> {
    element
        .children_named(METADATA_NS, "KeyDescriptor")
        .map(KeyDescriptor::from_xml)
        .collect()
}

fn endpoints(element: &XmlElement, local: &str) -> SamlResult<Vec<Endpoint>> {
    element
        .children_named(METADATA_NS, local)
        .map(Endpoint::from_xml)
        .collect()
}

fn name_id_formats(element: &XmlElement) -> Vec<String> {
    element
        .children_named(METADATA_NS, "NameIDFormat")
        .map(|f| f.text().trim().to_string())
        .collect()
}

fn push_common(
    mut element: XmlElement,
    keys: &[KeyDescriptor],
    slo: &[Endpoint],
    formats: &[String],
) -> XmlElement {
    for key in keys {
        element = element.with_child(key.to_xml());
    }
    for endpoint in slo {
        element = element.with_child(endpoint.to_xml("md:SingleLogoutService"));
    }
    for format in formats {
        element = element
            .with_child(XmlElement::new("md:NameIDFormat", METADATA_NS).with_text(format.clone()));
    }
    element
}

/// A SAML 2.0 `md:IDPSSODescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpSsoDescriptor {
    /// The `WantAuthnRequestsSigned` attribute as written.
    pub want_authn_requests_signed: Option<bool>,
    /// Published keys.
    pub key_descriptors: Vec<KeyDescriptor>,
    /// Single logout endpoints, kept for round trips.
    pub single_logout_services: Vec<Endpoint>,
    /// Supported name ID formats.
    pub name_id_formats: Vec<String>,
    /// Single sign-on endpoints.
    pub single_sign_on_services: Vec<Endpoint>,
    /// Attributes the IdP can provide.
    pub attributes: Vec<Attribute>,
}

impl IdpSsoDescriptor {
    /// Returns whether the IdP wants signed authentication requests.
    #[must_use]
    pub fn wants_authn_requests_signed(&self) -> bool {
        self.want_authn_requests_signed.unwrap_or(false)
    }

    /// Returns the first SSO endpoint for `binding`.
    #[must_use]
    pub fn sso_endpoint(&self, binding: SamlBinding) -> Option<&Endpoint> {
        self.single_sign_on_services
            .iter()
            .find(|e| e.binding == binding.uri())
    }

    /// Returns the certificates usable for signature verification.
    pub fn signing_certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.key_descriptors
            .iter()
            .filter(|k| k.is_signing())
            .map(|k| &k.certificate)
    }

    pub(crate) fn to_xml(&self) -> XmlElement {
        let mut element = push_common(
            XmlElement::new("md:IDPSSODescriptor", METADATA_NS)
                .with_attr("protocolSupportEnumeration", SAMLP_NS)
                .with_opt_attr(
                    "WantAuthnRequestsSigned",
                    self.want_authn_requests_signed.map(|w| w.to_string()),
                ),
            &self.key_descriptors,
            &self.single_logout_services,
            &self.name_id_formats,
        );
        for endpoint in &self.single_sign_on_services {
            element = element.with_child(endpoint.to_xml("md:SingleSignOnService"));
        }
        for attribute in &self.attributes {
            element = element.with_child(attribute.to_metadata_xml());
        }
        element
    }

    pub(crate) fn from_xml(element: &XmlElement) -> SamlResult<Option<Self>> {
        if !supports_saml2(element) {
            return Ok(None);
        }
        let single_sign_on_services = endpoints(element, "SingleSignOnService")?;
        if single_sign_on_services.is_empty() {
            return Err(SamlError::InvalidMetadata(
                "IDPSSODescriptor without SingleSignOnService".to_string(),
            ));
        }
        Ok(Some(Self {
            want_authn_requests_signed: opt_bool(element, "WantAuthnRequestsSigned")?,
            key_descriptors: key_descriptors(element)?,
            single_logout_services: endpoints(element, "SingleLogoutService")?,
            name_id_formats: name_id_formats(element),
            single_sign_on_services,
            attributes: element
                .children_named(SAML_NS, "Attribute")
                .map(Attribute::from_xml)
                .collect::<SamlResult<_>>()?,
        }))
    }
}

/// A SAML 2.0 `md:SPSSODescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpSsoDescriptor {
    /// The `AuthnRequestsSigned` attribute as written.
    pub authn_requests_signed: Option<bool>,
    /// The `WantAssertionsSigned` attribute as written.
    pub want_assertions_signed: Option<bool>,
    /// Published keys.
    pub key_descriptors: Vec<KeyDescriptor>,
    /// Single logout endpoints, kept for round trips.
    pub single_logout_services: Vec<Endpoint>,
    /// Supported name ID formats.
    pub name_id_formats: Vec<String>,
    /// Assertion consumer endpoints.
    pub assertion_consumer_services: Vec<IndexedEndpoint>,
    /// Attribute consuming services.
    pub attribute_consuming_services: Vec<AttributeConsumingServiceDescriptor>,
}

impl SpSsoDescriptor {
    /// Returns whether the SP signs its authentication requests.
    #[must_use]
    pub fn signs_authn_requests(&self) -> bool {
        self.authn_requests_signed.unwrap_or(false)
    }

    /// Returns whether the SP wants signed assertions.
    #[must_use]
    pub fn wants_assertions_signed(&self) -> bool {
        self.want_assertions_signed.unwrap_or(false)
    }

    /// Returns the certificates usable for signature verification.
    pub fn signing_certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.key_descriptors
            .iter()
            .filter(|k| k.is_signing())
            .map(|k| &k.certificate)
    }

    /// Returns the assertion consumer service at `location`.
    #[must_use]
    pub fn acs_by_location(&self, location: &str) -> Option<&IndexedEndpoint> {
        self.assertion_consumer_services
            .iter()
            .find(|e| e.endpoint.location == location)
    }

    /// Returns the assertion consumer service with `index`.
    #[must_use]
    pub fn acs_by_index(&self, index: u16) -> Option<&IndexedEndpoint> {
        self.assertion_consumer_services
            .iter()
            .find(|e| e.index == index)
    }

    /// Returns the default assertion consumer service.
    #[must_use]
    pub fn default_acs(&self) -> Option<&IndexedEndpoint> {
        select_default(&self.assertion_consumer_services)
    }

    /// Returns the attribute consuming service with `index`.
    #[must_use]
    pub fn attribute_consuming_service(
        &self,
        index: u16,
    ) -> Option<&AttributeConsumingServiceDescriptor> {
        self.attribute_consuming_services
            .iter()
            .find(|s| s.index == index)
    }

    pub(crate) fn to_xml(&self) -> XmlElement {
        let mut element = push_common(
            XmlElement::new("md:SPSSODescriptor", METADATA_NS)
                .with_attr("protocolSupportEnumeration", SAMLP_NS)
                .with_opt_attr(
                    "AuthnRequestsSigned",
                    self.authn_requests_signed.map(|s| s.to_string()),
                )
                .with_opt_attr(
                    "WantAssertionsSigned",
                    self.want_assertions_signed.map(|w| w.to_string()),
                ),
            &self.key_descriptors,
            &self.single_logout_services,
            &self.name_id_formats,
        );
        for endpoint in &self.assertion_consumer_services {
            element = element.with_child(endpoint.to_xml("md:AssertionConsumerService"));
        }
        for service in &self.attribute_consuming_services {
            element = element.with_child(service.to_xml());
        }
        element
    }

    pub(crate) fn from_xml(element: &XmlElement) -> SamlResult<Option<Self>> {
        if !supports_saml2(element) {
            return Ok(None);
        }
        let assertion_consumer_services = element
            .children_named(METADATA_NS, "AssertionConsumerService")
            .map(IndexedEndpoint::from_xml)
            .collect::<SamlResult<Vec<_>>>()?;
        if assertion_consumer_services.is_empty() {
            return Err(SamlError::InvalidMetadata(
                "SPSSODescriptor without AssertionConsumerService".to_string(),
            ));
        }
        Ok(Some(Self {
            authn_requests_signed: opt_bool(element, "AuthnRequestsSigned")?,
            want_assertions_signed: opt_bool(element, "WantAssertionsSigned")?,
            key_descriptors: key_descriptors(element)?,
            single_logout_services: endpoints(element, "SingleLogoutService")?,
            name_id_formats: name_id_formats(element),
            assertion_consumer_services,
            attribute_consuming_services: element
                .children_named(METADATA_NS, "AttributeConsumingService")
                .map(AttributeConsumingServiceDescriptor::from_xml)
                .collect::<SamlResult<_>>()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(index: u16, is_default: Option<bool>) -> IndexedEndpoint {
        IndexedEndpoint {
            endpoint: Endpoint::new(SamlBinding::HttpPost, format!("https://sp/{index}")),
            index,
            is_default,
        }
    }

    #[test]
    fn default_prefers_explicit_true() {
        let items = [indexed(1, None), indexed(2, Some(true))];
        assert_eq!(select_default(&items).unwrap().index, 2);
    }

    #[test]
    fn default_falls_back_to_unmarked() {
        let items = [indexed(1, Some(false)), indexed(2, None)];
        assert_eq!(select_default(&items).unwrap().index, 2);
    }

    #[test]
    fn default_falls_back_to_first() {
        let items = [indexed(3, Some(false)), indexed(4, Some(false))];
        assert_eq!(select_default(&items).unwrap().index, 3);
        assert!(select_default::<IndexedEndpoint>(&[]).is_none());
    }

    #[test]
    fn non_saml2_descriptor_is_skipped() {
        let element = XmlElement::new("md:IDPSSODescriptor", METADATA_NS)
            .with_attr("protocolSupportEnumeration", "urn:oasis:names:tc:SAML:1.1:protocol");
        assert!(IdpSsoDescriptor::from_xml(&element).unwrap().is_none());
    }

    #[test]
    fn idp_without_sso_is_invalid() {
        let element = XmlElement::new("md:IDPSSODescriptor", METADATA_NS)
            .with_attr("protocolSupportEnumeration", SAMLP_NS);
        assert!(matches!(
            IdpSsoDescriptor::from_xml(&element),
            Err(SamlError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn unknown_key_use_is_invalid() {
        let element = XmlElement::new("md:KeyDescriptor", METADATA_NS).with_attr("use", "both");
        assert!(KeyDescriptor::from_xml(&element).is_err());
    }
}
