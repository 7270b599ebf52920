//! SAML Name ID types.
//!
//! Name identifiers are used to identify subjects in SAML assertions.

use serde::{Deserialize, Serialize};

use super::{NameIdFormat, SAMLP_NS, SAML_NS};
use crate::error::SamlResult;
use crate::xml::{opt_bool, XmlElement};

/// SAML Name ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format of the name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// Creates a name ID with an explicit format URI.
    #[must_use]
    pub fn with_format_uri(value: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::new(value)
        }
    }

    /// Creates a new persistent name ID.
    #[must_use]
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::with_format_uri(value, NameIdFormat::Persistent.uri())
    }

    /// Creates a new transient name ID.
    #[must_use]
    pub fn transient(value: impl Into<String>) -> Self {
        Self::with_format_uri(value, NameIdFormat::Transient.uri())
    }

    /// Sets the name qualifier.
    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Returns the format URI, defaulting to `unspecified`.
    #[must_use]
    pub fn format_uri(&self) -> &str {
        self.format
            .as_deref()
            .unwrap_or_else(|| NameIdFormat::Unspecified.uri())
    }

    /// Builds the `saml:NameID` element.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        XmlElement::new("saml:NameID", SAML_NS)
            .with_opt_attr("NameQualifier", self.name_qualifier.clone())
            .with_opt_attr("SPNameQualifier", self.sp_name_qualifier.clone())
            .with_opt_attr("Format", self.format.clone())
            .with_text(self.value.clone())
    }

    /// Reads a `saml:NameID` element.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            value: element.text().trim().to_string(),
            format: element.attr("Format").map(String::from),
            name_qualifier: element.attr("NameQualifier").map(String::from),
            sp_name_qualifier: element.attr("SPNameQualifier").map(String::from),
        })
    }
}

/// Name ID policy for authentication requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// The requested name ID format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The SP name qualifier for the name ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// Whether a new identifier may be created for this request.
    #[serde(default)]
    pub allow_create: bool,
}

impl NameIdPolicy {
    /// Creates a policy requesting a specific format URI.
    #[must_use]
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            sp_name_qualifier: None,
            allow_create: false,
        }
    }

    /// Sets whether new identifiers can be created.
    #[must_use]
    pub const fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    /// Builds the `samlp:NameIDPolicy` element.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        XmlElement::new("samlp:NameIDPolicy", SAMLP_NS)
            .with_opt_attr("Format", self.format.clone())
            .with_opt_attr("SPNameQualifier", self.sp_name_qualifier.clone())
            .with_attr("AllowCreate", self.allow_create.to_string())
    }

    /// Reads a `samlp:NameIDPolicy` element.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            format: element.attr("Format").map(String::from),
            sp_name_qualifier: element.attr("SPNameQualifier").map(String::from),
            allow_create: opt_bool(element, "AllowCreate")?.unwrap_or(false),
        })
    }
}
