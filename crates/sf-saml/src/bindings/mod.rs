//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//!
//! HTTP handling itself belongs to the host. [`OutboundMessage`] is what the
//! engine hands to the host for delivery, and [`InboundMessage`] is what the
//! host hands back when a message arrives.

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamlMessageType {
    /// AuthnRequest message.
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// The signature (for redirect binding).
    pub signature: Option<String>,
    /// The signature algorithm (for redirect binding).
    pub sig_alg: Option<String>,
    /// The raw query octets covered by `signature` (for redirect binding).
    pub signed_query: Option<String>,
}

/// A message received by the host over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// HTTP-POST form fields.
    Post {
        /// The `SAMLRequest` or `SAMLResponse` field value.
        message: String,
        /// Whether `message` came from `SAMLResponse`.
        is_response: bool,
        /// The `RelayState` field, if any.
        relay_state: Option<String>,
    },
    /// The full request URL of an HTTP-Redirect.
    Redirect {
        /// Absolute URL including the query.
        url: String,
    },
}

impl InboundMessage {
    /// Wraps a POSTed `SAMLResponse` field.
    #[must_use]
    pub fn post_response(message: impl Into<String>, relay_state: Option<String>) -> Self {
        Self::Post {
            message: message.into(),
            is_response: true,
            relay_state,
        }
    }

    /// Wraps a POSTed `SAMLRequest` field.
    #[must_use]
    pub fn post_request(message: impl Into<String>, relay_state: Option<String>) -> Self {
        Self::Post {
            message: message.into(),
            is_response: false,
            relay_state,
        }
    }

    /// Returns the binding the message arrived over.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        match self {
            Self::Post { .. } => SamlBinding::HttpPost,
            Self::Redirect { .. } => SamlBinding::HttpRedirect,
        }
    }

    /// Decodes the binding layer.
    pub fn decode(&self) -> SamlResult<DecodedMessage> {
        match self {
            Self::Post {
                message,
                is_response,
                relay_state,
            } => {
                let message_type = if *is_response {
                    SamlMessageType::Response
                } else {
                    SamlMessageType::Request
                };
                HttpPostBinding::decode(message, message_type, relay_state.as_deref())
            }
            Self::Redirect { url } => HttpRedirectBinding::decode_url(url),
        }
    }
}

/// A message the host must deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The binding used.
    pub binding: SamlBinding,
    /// The endpoint the message is addressed to.
    pub destination: String,
    /// Request or response.
    pub message_type: SamlMessageType,
    /// The RelayState value travelling with the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_state: Option<String>,
    /// For HTTP-Redirect the complete URL, for HTTP-POST the base64 field value.
    pub encoded: String,
}

impl OutboundMessage {
    /// Encodes `xml` for `binding`, signing the query when a signer is given for HTTP-Redirect.
    pub fn encode(
        binding: SamlBinding,
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<String>,
        redirect_signer: Option<&crate::signature::XmlSigner<'_>>,
    ) -> SamlResult<Self> {
        let encoded = match (binding, redirect_signer) {
            (SamlBinding::HttpPost, _) => HttpPostBinding::encode_value(xml),
            (SamlBinding::HttpRedirect, Some(signer)) => HttpRedirectBinding::encode_signed(
                xml,
                destination,
                relay_state.as_deref(),
                message_type,
                signer,
            )?,
            (SamlBinding::HttpRedirect, None) => match message_type {
                SamlMessageType::Request => {
                    HttpRedirectBinding::encode_request(xml, destination, relay_state.as_deref())?
                }
                SamlMessageType::Response => {
                    HttpRedirectBinding::encode_response(xml, destination, relay_state.as_deref())?
                }
            },
            (other, _) => return Err(SamlError::UnsupportedBinding(other.uri().to_string())),
        };

        Ok(Self {
            binding,
            destination: destination.to_string(),
            message_type,
            relay_state,
            encoded,
        })
    }

    /// Returns the auto-submitting HTML form for an HTTP-POST message.
    #[must_use]
    pub fn html_form(&self) -> Option<String> {
        (self.binding == SamlBinding::HttpPost).then(|| {
            HttpPostBinding::form(
                &self.encoded,
                &self.destination,
                self.relay_state.as_deref(),
                self.message_type,
            )
        })
    }

    /// Returns the redirect URL for an HTTP-Redirect message.
    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        (self.binding == SamlBinding::HttpRedirect).then_some(self.encoded.as_str())
    }

    /// Converts the message into what the receiving side would get, as if delivered.
    #[must_use]
    pub fn to_inbound(&self) -> InboundMessage {
        match self.binding {
            SamlBinding::HttpRedirect => InboundMessage::Redirect {
                url: self.encoded.clone(),
            },
            _ => InboundMessage::Post {
                message: self.encoded.clone(),
                is_response: self.message_type == SamlMessageType::Response,
                relay_state: self.relay_state.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_outbound_round_trip() {
        let outbound = OutboundMessage::encode(
            SamlBinding::HttpPost,
            "<samlp:Response/>",
            "https://sp.example.org/sp/post",
            SamlMessageType::Response,
            Some("tok".to_string()),
            None,
        )
        .unwrap();

        assert!(outbound.html_form().unwrap().contains("SAMLResponse"));
        assert!(outbound.redirect_url().is_none());

        let decoded = outbound.to_inbound().decode().unwrap();
        assert_eq!(decoded.xml, "<samlp:Response/>");
        assert_eq!(decoded.relay_state.as_deref(), Some("tok"));
    }

    #[test]
    fn redirect_outbound_round_trip() {
        let outbound = OutboundMessage::encode(
            SamlBinding::HttpRedirect,
            "<samlp:AuthnRequest/>",
            "https://idp.example.org/idp/redirect",
            SamlMessageType::Request,
            Some("tok".to_string()),
            None,
        )
        .unwrap();

        let inbound = outbound.to_inbound();
        assert_eq!(inbound.binding(), SamlBinding::HttpRedirect);
        let decoded = inbound.decode().unwrap();
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.relay_state.as_deref(), Some("tok"));
    }

    #[test]
    fn artifact_binding_is_unsupported() {
        let result = OutboundMessage::encode(
            SamlBinding::HttpArtifact,
            "<x/>",
            "https://sp.example.org",
            SamlMessageType::Response,
            None,
            None,
        );
        assert!(matches!(result, Err(SamlError::UnsupportedBinding(_))));
    }
}
