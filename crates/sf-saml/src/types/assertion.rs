//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{
    attrname_formats, confirmation_methods, issuer_element, read_issuer, AuthnContextClass, NameId,
    SAML_NS, XSI_NS, XS_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::{format_instant, opt_instant, parse_instant, XmlElement};

/// SAML Assertion.
///
/// A package of information that supplies one or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// The subject of this assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Authentication statement describing how the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_statement: Option<AuthnStatement>,

    /// Attribute statements about the subject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_statements: Vec<AttributeStatement>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl Assertion {
    /// Creates a new assertion.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: default_version(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            subject: None,
            conditions: None,
            authn_statement: None,
            attribute_statements: Vec::new(),
        }
    }

    /// Creates a new assertion with a custom ID.
    #[must_use]
    pub fn with_id(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(issuer)
        }
    }

    /// Sets the issue instant.
    #[must_use]
    pub const fn issued_at(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Sets the authentication statement.
    #[must_use]
    pub fn with_authn_statement(mut self, statement: AuthnStatement) -> Self {
        self.authn_statement = Some(statement);
        self
    }

    /// Adds an attribute statement.
    #[must_use]
    pub fn with_attribute_statement(mut self, statement: AttributeStatement) -> Self {
        self.attribute_statements.push(statement);
        self
    }

    /// Returns the subject's name identifier, if any.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        self.subject.as_ref().and_then(|s| s.name_id.as_ref())
    }

    /// Iterates over the attributes of every attribute statement.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attribute_statements
            .iter()
            .flat_map(|statement| statement.attributes.iter())
    }

    /// Builds the `saml:Assertion` element.
    ///
    /// Children follow the schema order: Issuer, Subject, Conditions,
    /// AuthnStatement, AttributeStatement.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("saml:Assertion", SAML_NS)
            .with_namespace("saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", self.version.clone())
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_child(issuer_element(&self.issuer))
            .with_opt_child(self.subject.as_ref().map(Subject::to_xml))
            .with_opt_child(self.conditions.as_ref().map(Conditions::to_xml))
            .with_opt_child(self.authn_statement.as_ref().map(AuthnStatement::to_xml));
        let typed = self
            .attributes()
            .flat_map(|a| a.values.iter())
            .any(|v| v.xsi_type.is_some());
        if typed {
            element = element
                .with_namespace("xs", XS_NS)
                .with_namespace("xsi", XSI_NS);
        }
        for statement in &self.attribute_statements {
            element = element.with_child(statement.to_xml());
        }
        element
    }

    /// Reads a `saml:Assertion` element.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        if !element.is(SAML_NS, "Assertion") {
            return Err(SamlError::UnexpectedMessage {
                expected: "Assertion",
                actual: element.qname(),
            });
        }
        let version = element.required_attr("Version")?;
        if version != "2.0" {
            return Err(SamlError::InvalidValue(format!(
                "unsupported SAML version: {version}"
            )));
        }

        Ok(Self {
            id: element.required_attr("ID")?.to_string(),
            version: version.to_string(),
            issue_instant: parse_instant(element.required_attr("IssueInstant")?)?,
            issuer: read_issuer(element)?,
            subject: element
                .child(SAML_NS, "Subject")
                .map(Subject::from_xml)
                .transpose()?,
            conditions: element
                .child(SAML_NS, "Conditions")
                .map(Conditions::from_xml)
                .transpose()?,
            authn_statement: element
                .child(SAML_NS, "AuthnStatement")
                .map(AuthnStatement::from_xml)
                .transpose()?,
            attribute_statements: element
                .children_named(SAML_NS, "AttributeStatement")
                .map(AttributeStatement::from_xml)
                .collect::<SamlResult<_>>()?,
        })
    }
}

/// Subject of an assertion.
///
/// Identifies the principal that is the subject of all statements in the assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier for the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Subject confirmation data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// Creates a new subject with the given name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            subject_confirmations: Vec::new(),
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmations.push(confirmation);
        self
    }

    fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("saml:Subject", SAML_NS)
            .with_opt_child(self.name_id.as_ref().map(NameId::to_xml));
        for confirmation in &self.subject_confirmations {
            element = element.with_child(confirmation.to_xml());
        }
        element
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            name_id: element
                .child(SAML_NS, "NameID")
                .map(NameId::from_xml)
                .transpose()?,
            subject_confirmations: element
                .children_named(SAML_NS, "SubjectConfirmation")
                .map(SubjectConfirmation::from_xml)
                .collect::<SamlResult<_>>()?,
        })
    }
}

/// Subject confirmation.
///
/// Information that allows the assertion consumer to confirm the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The confirmation method.
    pub method: String,

    /// Additional confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer() -> Self {
        Self {
            method: confirmation_methods::BEARER.to_string(),
            subject_confirmation_data: None,
        }
    }

    /// Sets the confirmation data.
    #[must_use]
    pub fn with_data(mut self, data: SubjectConfirmationData) -> Self {
        self.subject_confirmation_data = Some(data);
        self
    }

    /// Returns whether this is a bearer confirmation.
    #[must_use]
    pub fn is_bearer(&self) -> bool {
        self.method == confirmation_methods::BEARER
    }

    fn to_xml(&self) -> XmlElement {
        let data = self.subject_confirmation_data.as_ref().map(|data| {
            XmlElement::new("saml:SubjectConfirmationData", SAML_NS)
                .with_opt_attr("NotBefore", data.not_before.map(format_instant))
                .with_opt_attr("NotOnOrAfter", data.not_on_or_after.map(format_instant))
                .with_opt_attr("Recipient", data.recipient.clone())
                .with_opt_attr("InResponseTo", data.in_response_to.clone())
        });
        XmlElement::new("saml:SubjectConfirmation", SAML_NS)
            .with_attr("Method", self.method.clone())
            .with_opt_child(data)
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        let data = element
            .child(SAML_NS, "SubjectConfirmationData")
            .map(|data| -> SamlResult<_> {
                Ok(SubjectConfirmationData {
                    in_response_to: data.attr("InResponseTo").map(String::from),
                    not_on_or_after: opt_instant(data, "NotOnOrAfter")?,
                    not_before: opt_instant(data, "NotBefore")?,
                    recipient: data.attr("Recipient").map(String::from),
                })
            })
            .transpose()?;
        Ok(Self {
            method: element.required_attr("Method")?.to_string(),
            subject_confirmation_data: data,
        })
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// The request ID that this assertion responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Time after which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Time before which the subject cannot be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// The location to which the assertion can be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl SubjectConfirmationData {
    /// Creates confirmation data for a response to `request_id` delivered to `recipient`.
    #[must_use]
    pub fn for_request(
        request_id: Option<String>,
        recipient: impl Into<String>,
        not_on_or_after: DateTime<Utc>,
    ) -> Self {
        Self {
            in_response_to: request_id,
            recipient: Some(recipient.into()),
            not_on_or_after: Some(not_on_or_after),
            not_before: None,
        }
    }
}

/// Conditions for assertion validity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at or after which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restrictions. Each restriction must be satisfied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,
}

impl Conditions {
    /// Creates conditions valid from `now` for `validity`.
    #[must_use]
    pub fn valid_for(now: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            not_before: Some(now),
            not_on_or_after: Some(now + validity),
            audience_restrictions: Vec::new(),
        }
    }

    /// Adds an audience restriction.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience_restrictions.push(AudienceRestriction {
            audiences: vec![audience.into()],
        });
        self
    }

    /// Returns whether `now` lies in `[NotBefore - skew, NotOnOrAfter + skew)`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let started = self.not_before.map_or(true, |nb| now + skew >= nb);
        let ended = self.not_on_or_after.is_some_and(|na| now - skew >= na);
        started && !ended
    }

    /// Returns whether every audience restriction admits `audience`.
    #[must_use]
    pub fn admits(&self, audience: &str) -> bool {
        self.audience_restrictions
            .iter()
            .all(|restriction| restriction.audiences.iter().any(|a| a == audience))
    }

    fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("saml:Conditions", SAML_NS)
            .with_opt_attr("NotBefore", self.not_before.map(format_instant))
            .with_opt_attr("NotOnOrAfter", self.not_on_or_after.map(format_instant));
        for restriction in &self.audience_restrictions {
            let mut child = XmlElement::new("saml:AudienceRestriction", SAML_NS);
            for audience in &restriction.audiences {
                child = child
                    .with_child(XmlElement::new("saml:Audience", SAML_NS).with_text(audience.clone()));
            }
            element = element.with_child(child);
        }
        element
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            not_before: opt_instant(element, "NotBefore")?,
            not_on_or_after: opt_instant(element, "NotOnOrAfter")?,
            audience_restrictions: element
                .children_named(SAML_NS, "AudienceRestriction")
                .map(|restriction| AudienceRestriction {
                    audiences: restriction
                        .children_named(SAML_NS, "Audience")
                        .map(|a| a.text().trim().to_string())
                        .collect(),
                })
                .collect(),
        })
    }
}

/// Audience restriction condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// List of allowed audiences; any one of them satisfies the restriction.
    pub audiences: Vec<String>,
}

/// Authentication statement.
///
/// Describes how and when the subject was authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// Time when authentication occurred.
    pub authn_instant: DateTime<Utc>,

    /// Session index for single logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// Time when the session expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// The authentication context class reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    /// Creates a new authentication statement.
    #[must_use]
    pub fn new(authn_instant: DateTime<Utc>, context_class: AuthnContextClass) -> Self {
        Self {
            authn_instant,
            session_index: Some(format!("_session{}", uuid::Uuid::new_v4())),
            session_not_on_or_after: None,
            authn_context_class_ref: Some(context_class.uri().to_string()),
        }
    }

    /// Sets when the session expires.
    #[must_use]
    pub const fn with_session_not_on_or_after(mut self, instant: DateTime<Utc>) -> Self {
        self.session_not_on_or_after = Some(instant);
        self
    }

    fn to_xml(&self) -> XmlElement {
        let context = XmlElement::new("saml:AuthnContext", SAML_NS).with_opt_child(
            self.authn_context_class_ref.as_ref().map(|class| {
                XmlElement::new("saml:AuthnContextClassRef", SAML_NS).with_text(class.clone())
            }),
        );
        XmlElement::new("saml:AuthnStatement", SAML_NS)
            .with_attr("AuthnInstant", format_instant(self.authn_instant))
            .with_opt_attr("SessionIndex", self.session_index.clone())
            .with_opt_attr(
                "SessionNotOnOrAfter",
                self.session_not_on_or_after.map(format_instant),
            )
            .with_child(context)
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            authn_instant: parse_instant(element.required_attr("AuthnInstant")?)?,
            session_index: element.attr("SessionIndex").map(String::from),
            session_not_on_or_after: opt_instant(element, "SessionNotOnOrAfter")?,
            authn_context_class_ref: element
                .child(SAML_NS, "AuthnContext")
                .and_then(|c| c.child_text(SAML_NS, "AuthnContextClassRef")),
        })
    }
}

/// Attribute statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// The attributes.
    pub attributes: Vec<Attribute>,
}

impl AttributeStatement {
    /// Creates an empty attribute statement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Returns whether the statement carries no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn to_xml(&self) -> XmlElement {
        self.attributes.iter().fold(
            XmlElement::new("saml:AttributeStatement", SAML_NS),
            |element, attribute| element.with_child(attribute.to_xml()),
        )
    }

    fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            attributes: element
                .children_named(SAML_NS, "Attribute")
                .map(Attribute::from_xml)
                .collect::<SamlResult<_>>()?,
        })
    }
}

/// A single `saml:AttributeValue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// Lexical value.
    pub text: String,

    /// The `xsi:type` QName as written, e.g. `xs:boolean`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsi_type: Option<String>,
}

impl AttributeValue {
    /// Creates an untyped value.
    #[must_use]
    pub fn untyped(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            xsi_type: None,
        }
    }

    /// Creates a value with an `xsi:type`.
    #[must_use]
    pub fn typed(text: impl Into<String>, xsi_type: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            xsi_type: Some(xsi_type.into()),
        }
    }

    /// Returns the local part of the `xsi:type`, if any.
    #[must_use]
    pub fn type_local_name(&self) -> Option<&str> {
        self.xsi_type
            .as_deref()
            .map(|t| t.split_once(':').map_or(t, |(_, local)| local))
    }
}

/// SAML attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,

    /// The attribute name format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// The attribute values.
    #[serde(default)]
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    /// Creates an attribute without values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
            values: Vec::new(),
        }
    }

    /// Creates an attribute with a single untyped value.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name).with_value(AttributeValue::untyped(value))
    }

    /// Adds a value.
    #[must_use]
    pub fn with_value(mut self, value: AttributeValue) -> Self {
        self.values.push(value);
        self
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    /// Returns the name format, defaulting to `unspecified`.
    #[must_use]
    pub fn effective_name_format(&self) -> &str {
        self.name_format
            .as_deref()
            .unwrap_or(attrname_formats::UNSPECIFIED)
    }

    /// Returns the first value's text.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(|v| v.text.as_str())
    }

    fn to_xml(&self) -> XmlElement {
        let element = XmlElement::new("saml:Attribute", SAML_NS)
            .with_attr("Name", self.name.clone())
            .with_opt_attr("NameFormat", self.name_format.clone())
            .with_opt_attr("FriendlyName", self.friendly_name.clone());
        self.values.iter().fold(element, |element, value| {
            element.with_child(
                XmlElement::new("saml:AttributeValue", SAML_NS)
                    .with_opt_attr("xsi:type", value.xsi_type.clone())
                    .with_text(value.text.clone()),
            )
        })
    }

    pub(crate) fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            name: element.required_attr("Name")?.to_string(),
            name_format: element.attr("NameFormat").map(String::from),
            friendly_name: element.attr("FriendlyName").map(String::from),
            values: element
                .children_named(SAML_NS, "AttributeValue")
                .map(|value| AttributeValue {
                    text: value.text(),
                    xsi_type: value.prefixed_attr("type").map(String::from),
                })
                .collect(),
        })
    }

    /// Builds the element as used inside metadata descriptors.
    #[must_use]
    pub fn to_metadata_xml(&self) -> XmlElement {
        self.to_xml()
    }
}
