//! SAML 2.0 metadata.
//!
//! [`EntityDescriptor`] is the parsed form of a partner's (or our own)
//! metadata document. Only SAML 2.0 IdP and SP SSO descriptors are modelled;
//! other role descriptors are skipped on parse, as are descriptors whose
//! `protocolSupportEnumeration` does not list SAML 2.0.
//!
//! Serialization follows the metadata schema order, so a parsed model
//! serializes to a document that parses back to the same model.

mod descriptors;

pub use descriptors::*;

use chrono::{DateTime, Utc};
use sf_crypto::Certificate;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::{METADATA_NS, SAML_NS, XMLDSIG_NS};
use crate::xml::{format_instant, opt_instant, XmlElement};

/// A `md:EntityDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// The entity ID.
    pub entity_id: String,
    /// Document ID, needed to sign the descriptor.
    pub id: Option<String>,
    /// Instant after which the document must not be used.
    pub valid_until: Option<DateTime<Utc>>,
    /// The `cacheDuration` attribute as written.
    pub cache_duration: Option<String>,
    /// The SAML 2.0 IdP descriptor.
    pub idp_sso: Option<IdpSsoDescriptor>,
    /// The SAML 2.0 SP descriptor.
    pub sp_sso: Option<SpSsoDescriptor>,
}

impl EntityDescriptor {
    /// Creates an empty descriptor for `entity_id` with a fresh document ID.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            id: Some(format!("_id{}", uuid::Uuid::new_v4())),
            valid_until: None,
            cache_duration: None,
            idp_sso: None,
            sp_sso: None,
        }
    }

    /// Sets `validUntil`.
    #[must_use]
    pub const fn valid_until(mut self, instant: DateTime<Utc>) -> Self {
        self.valid_until = Some(instant);
        self
    }

    /// Sets the IdP descriptor.
    #[must_use]
    pub fn with_idp(mut self, idp: IdpSsoDescriptor) -> Self {
        self.idp_sso = Some(idp);
        self
    }

    /// Sets the SP descriptor.
    #[must_use]
    pub fn with_sp(mut self, sp: SpSsoDescriptor) -> Self {
        self.sp_sso = Some(sp);
        self
    }

    /// Returns whether the document has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| now >= until)
    }

    /// Returns every signing certificate, IdP first, without duplicates.
    #[must_use]
    pub fn signing_certificates(&self) -> Vec<Certificate> {
        let mut certificates: Vec<Certificate> = Vec::new();
        let idp = self.idp_sso.iter().flat_map(IdpSsoDescriptor::signing_certificates);
        let sp = self.sp_sso.iter().flat_map(SpSsoDescriptor::signing_certificates);
        for certificate in idp.chain(sp) {
            if !certificates.contains(certificate) {
                certificates.push(certificate.clone());
            }
        }
        certificates
    }

    /// Builds the `md:EntityDescriptor` element.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        XmlElement::new("md:EntityDescriptor", METADATA_NS)
            .with_namespace("md", METADATA_NS)
            .with_namespace("ds", XMLDSIG_NS)
            .with_namespace("saml", SAML_NS)
            .with_attr("entityID", self.entity_id.clone())
            .with_opt_attr("ID", self.id.clone())
            .with_opt_attr("validUntil", self.valid_until.map(format_instant))
            .with_opt_attr("cacheDuration", self.cache_duration.clone())
            .with_opt_child(self.idp_sso.as_ref().map(IdpSsoDescriptor::to_xml))
            .with_opt_child(self.sp_sso.as_ref().map(SpSsoDescriptor::to_xml))
    }

    /// Serializes the descriptor as a document.
    #[must_use]
    pub fn to_document(&self) -> String {
        self.to_xml().to_document()
    }

    /// Serializes the descriptor as a document signed with `signer`.
    pub fn to_signed_document(&self, signer: &XmlSigner<'_>) -> SamlResult<String> {
        let mut element = self.to_xml();
        if element.attr("ID").is_none() {
            element.set_attr("ID", format!("_id{}", uuid::Uuid::new_v4()));
        }
        signer.sign(&mut element, &[])?;
        Ok(element.to_document())
    }

    /// Reads a `md:EntityDescriptor` element.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        if !element.is(METADATA_NS, "EntityDescriptor") {
            return Err(SamlError::InvalidMetadata(format!(
                "expected md:EntityDescriptor, got {}",
                element.qname()
            )));
        }
        let entity_id = element
            .attr("entityID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SamlError::InvalidMetadata("missing entityID".to_string()))?
            .to_string();

        let mut idp_sso = None;
        let mut sp_sso = None;
        for child in element.elements() {
            if child.is(METADATA_NS, "IDPSSODescriptor") && idp_sso.is_none() {
                idp_sso = IdpSsoDescriptor::from_xml(child)?;
            } else if child.is(METADATA_NS, "SPSSODescriptor") && sp_sso.is_none() {
                sp_sso = SpSsoDescriptor::from_xml(child)?;
            }
        }
        if idp_sso.is_none() && sp_sso.is_none() {
            return Err(SamlError::InvalidMetadata(format!(
                "'{entity_id}' has no SAML 2.0 IdP or SP descriptor"
            )));
        }

        Ok(Self {
            entity_id,
            id: element.attr("ID").map(String::from),
            valid_until: opt_instant(element, "validUntil")
                .map_err(|e| SamlError::InvalidMetadata(e.to_string()))?,
            cache_duration: element.attr("cacheDuration").map(String::from),
            idp_sso,
            sp_sso,
        })
    }

    /// Parses a metadata document.
    ///
    /// Malformed XML is reported as [`SamlError::InvalidMetadata`].
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let root = parse_root(xml)?;
        Self::from_xml(&root)
    }
}

/// Parses a metadata document into its element tree, for signature checks.
pub fn parse_root(xml: &str) -> SamlResult<XmlElement> {
    XmlElement::parse(xml).map_err(|e| SamlError::InvalidMetadata(e.to_string()))
}
