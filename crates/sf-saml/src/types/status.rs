//! `samlp:Status`: a possibly nested status code and an optional message.

use serde::{Deserialize, Serialize};

use super::{status_codes, SAMLP_NS};
use crate::error::SamlResult;
use crate::xml::XmlElement;

/// Outcome reported by a Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The top-level code.
    pub status_code: StatusCode,
    /// Free-form explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// The success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// A failure with a top-level code, one sub-code and a message.
    #[must_use]
    pub fn error(top: &str, sub: &str, message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode {
                value: top.to_string(),
                status_code: Some(Box::new(StatusCode::new(sub))),
            },
            status_message: Some(message.into()),
        }
    }

    /// Returns whether the top-level code is Success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Builds the `samlp:Status` element.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        XmlElement::new("samlp:Status", SAMLP_NS)
            .with_child(self.status_code.to_xml())
            .with_opt_child(self.status_message.as_ref().map(|message| {
                XmlElement::new("samlp:StatusMessage", SAMLP_NS).with_text(message.clone())
            }))
    }

    /// Reads a `samlp:Status` element.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            status_code: StatusCode::from_xml(element.required_child(SAMLP_NS, "StatusCode")?)?,
            status_message: element.child_text(SAMLP_NS, "StatusMessage"),
        })
    }
}

/// A status code URI with an optional nested code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The code URI.
    pub value: String,
    /// The nested, more specific code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// A code without a nested code.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// Returns the nested code, if any.
    #[must_use]
    pub fn sub_status_value(&self) -> Option<&str> {
        self.status_code.as_deref().map(|s| s.value.as_str())
    }

    /// Builds the `samlp:StatusCode` element, nested codes included.
    #[must_use]
    pub fn to_xml(&self) -> XmlElement {
        XmlElement::new("samlp:StatusCode", SAMLP_NS)
            .with_attr("Value", self.value.clone())
            .with_opt_child(self.status_code.as_ref().map(|sub| sub.to_xml()))
    }

    /// Reads a `samlp:StatusCode` element.
    pub fn from_xml(element: &XmlElement) -> SamlResult<Self> {
        let sub = element
            .child(SAMLP_NS, "StatusCode")
            .map(Self::from_xml)
            .transpose()?;
        Ok(Self {
            value: element.required_attr("Value")?.to_string(),
            status_code: sub.map(Box::new),
        })
    }
}
