use sf_crypto::CryptoCapability;
use sf_saml::bindings::{OutboundMessage, SamlMessageType};
use sf_saml::signature::XmlSigner;
use sf_saml::xml::XmlNode;
use sf_saml::{AuthnRequest, Response, SamlBinding, SAML_NS};

use crate::error::{ConfigurationError, FederationError, FederationResult};

fn signing_error(err: sf_saml::SamlError) -> FederationError {
    ConfigurationError::Invalid(format!("cannot sign message: {err}")).into()
}

/// Encodes outgoing messages, signing them with the local key.
pub struct MessageBuilder<'a> {
    crypto: &'a dyn CryptoCapability,
}

impl<'a> MessageBuilder<'a> {
    /// Creates a builder over the local key.
    #[must_use]
    pub fn new(crypto: &'a dyn CryptoCapability) -> Self {
        Self { crypto }
    }

    /// Encodes an AuthnRequest for `binding`.
    ///
    /// HTTP-Redirect requests are signed over the query string, HTTP-POST
    /// requests carry an enveloped signature.
    pub fn authn_request(
        &self,
        request: &AuthnRequest,
        binding: SamlBinding,
        destination: &str,
        relay_state: Option<String>,
        sign: bool,
    ) -> FederationResult<OutboundMessage> {
        let signer = XmlSigner::new(self.crypto);
        let mut element = request.to_xml();
        let redirect_signer = match binding {
            SamlBinding::HttpPost if sign => {
                signer.sign(&mut element, &[]).map_err(signing_error)?;
                None
            }
            SamlBinding::HttpRedirect if sign => Some(&signer),
            _ => None,
        };
        OutboundMessage::encode(
            binding,
            &element.to_document(),
            destination,
            SamlMessageType::Request,
            relay_state,
            redirect_signer,
        )
        .map_err(|e| ConfigurationError::Invalid(e.to_string()).into())
    }

    /// Signs a Response and encodes it for HTTP-POST to its `Destination`.
    ///
    /// The Response is always signed; its assertions too when
    /// `sign_assertions` is set.
    pub fn response(
        &self,
        response: &Response,
        sign_assertions: bool,
        relay_state: Option<String>,
    ) -> FederationResult<OutboundMessage> {
        let destination = response
            .destination
            .as_deref()
            .ok_or_else(|| ConfigurationError::Invalid("response without Destination".to_string()))?;
        let signer = XmlSigner::new(self.crypto);
        let mut root = response.to_xml();

        if sign_assertions {
            let scope = root.scope_for_children(&[]);
            for node in &mut root.children {
                if let XmlNode::Element(child) = node {
                    if child.is(SAML_NS, "Assertion") {
                        signer.sign(child, &scope).map_err(signing_error)?;
                    }
                }
            }
        }
        signer.sign(&mut root, &[]).map_err(signing_error)?;

        OutboundMessage::encode(
            SamlBinding::HttpPost,
            &root.to_document(),
            destination,
            SamlMessageType::Response,
            relay_state,
            None,
        )
        .map_err(|e| ConfigurationError::Invalid(e.to_string()).into())
    }
}
