//! SAML Response types.
//!
//! Response messages sent by an identity provider to a service provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{issuer_element, Assertion, Status, SAMLP_NS, SAML_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::{format_instant, parse_instant, XmlElement};

/// SAML Response.
///
/// A response message sent from an identity provider to a service provider
/// containing authentication results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this response.
    pub issuer: String,

    /// The ID of the request this response is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,

    /// The assertions in this response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl Response {
    /// Creates a new success response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self::error(issuer, Status::success())
    }

    /// Creates a response carrying `status`.
    #[must_use]
    pub fn error(issuer: impl Into<String>, status: Status) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: default_version(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            in_response_to: None,
            destination: None,
            status,
            assertions: Vec::new(),
        }
    }

    /// Sets the issue instant.
    #[must_use]
    pub const fn issued_at(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Sets the request ID this response is for.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Adds an assertion to this response.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Returns true if this response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Gets the first assertion if present.
    #[must_use]
    pub fn first_assertion(&self) -> Option<&Assertion> {
        self.assertions.first()
    }

    /// Builds the `samlp:Response` document element.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        let element = XmlElement::new("samlp:Response", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", self.version.clone())
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_opt_attr("Destination", self.destination.clone())
            .with_opt_attr("InResponseTo", self.in_response_to.clone())
            .with_child(issuer_element(&self.issuer))
            .with_child(self.status.to_xml());
        self.assertions
            .iter()
            .fold(element, |element, assertion| element.with_child(assertion.to_xml()))
    }

    /// Reads a `samlp:Response` element.
    ///
    /// A response without its own `Issuer` takes the issuer of its first assertion.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        if !element.is(SAMLP_NS, "Response") {
            return Err(SamlError::UnexpectedMessage {
                expected: "Response",
                actual: element.qname(),
            });
        }
        let version = element.required_attr("Version")?;
        if version != "2.0" {
            return Err(SamlError::InvalidValue(format!(
                "unsupported SAML version: {version}"
            )));
        }

        let assertions = element
            .children_named(SAML_NS, "Assertion")
            .map(Assertion::from_xml)
            .collect::<SamlResult<Vec<_>>>()?;
        let issuer = element
            .child_text(SAML_NS, "Issuer")
            .or_else(|| assertions.first().map(|a| a.issuer.clone()))
            .filter(|issuer| !issuer.is_empty())
            .ok_or_else(|| SamlError::MissingElement("Issuer in Response".to_string()))?;

        Ok(Self {
            id: element.required_attr("ID")?.to_string(),
            version: version.to_string(),
            issue_instant: parse_instant(element.required_attr("IssueInstant")?)?,
            issuer,
            in_response_to: element.attr("InResponseTo").map(String::from),
            destination: element.attr("Destination").map(String::from),
            status: Status::from_xml(element.required_child(SAMLP_NS, "Status")?)?,
            assertions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{status_codes, sub_status_codes, NameId, Subject};

    #[test]
    fn response_success() {
        let response = Response::success("https://idp.example.org");
        assert!(response.is_success());
        assert!(response.id.starts_with("_id"));
        assert!(response.first_assertion().is_none());
    }

    #[test]
    fn response_xml_round_trip() {
        let response = Response::success("https://idp.example.org")
            .in_response_to("_req1")
            .with_destination("https://sp.example.org/sp/post")
            .with_assertion(
                Assertion::new("https://idp.example.org")
                    .with_subject(Subject::new(NameId::persistent("user-1"))),
            );
        let xml = response.to_xml().to_document();
        let mut parsed = Response::from_xml(&XmlElement::parse(&xml).unwrap()).unwrap();

        // IssueInstant loses sub-second precision on the wire.
        parsed.issue_instant = response.issue_instant;
        parsed.assertions[0].issue_instant = response.assertions[0].issue_instant;
        assert_eq!(parsed, response);
    }

    #[test]
    fn error_response_keeps_sub_status() {
        let response = Response::error(
            "https://idp.example.org",
            Status::error(
                status_codes::REQUESTER,
                sub_status_codes::INVALID_NAMEID_POLICY,
                "format not supported",
            ),
        );
        let parsed = Response::from_xml(&response.to_xml()).unwrap();
        assert!(!parsed.is_success());
        assert_eq!(
            parsed.status.status_code.sub_status_value(),
            Some(sub_status_codes::INVALID_NAMEID_POLICY)
        );
    }

    #[test]
    fn issuer_falls_back_to_assertion() {
        let mut element = Response::success("https://idp.example.org")
            .with_assertion(Assertion::new("https://idp.example.org"))
            .to_xml();
        element.remove_children(SAML_NS, "Issuer");
        let parsed = Response::from_xml(&element).unwrap();
        assert_eq!(parsed.issuer, "https://idp.example.org");
    }

    #[test]
    fn missing_status_is_rejected() {
        let mut element = Response::success("https://idp.example.org").to_xml();
        element.remove_children(SAMLP_NS, "Status");
        assert!(Response::from_xml(&element).is_err());
    }
}
