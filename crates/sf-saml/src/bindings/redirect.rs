//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.
//!
//! A signed redirect carries `SigAlg` and `Signature` parameters. The
//! signature covers the octets `SAMLRequest=…&RelayState=…&SigAlg=…` (or
//! `SAMLResponse=…`) exactly as they appear in the URL, so verification
//! works on the raw query rather than on decoded values.

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;

use super::{DecodedMessage, SamlMessageType};

/// Upper bound for an inflated message.
const MAX_INFLATED_LEN: u64 = 1024 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a SAML request for HTTP-Redirect binding.
    ///
    /// Returns a URL with the encoded message in query parameters.
    pub fn encode_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        Self::encode(xml, destination, relay_state, SamlMessageType::Request, None)
    }

    /// Encodes a SAML response for HTTP-Redirect binding.
    ///
    /// Returns a URL with the encoded message in query parameters.
    pub fn encode_response(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        Self::encode(xml, destination, relay_state, SamlMessageType::Response, None)
    }

    /// Encodes a message and signs the query with `signer`.
    ///
    /// The signature is over the query string parameters, not embedded in the XML.
    pub fn encode_signed(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        signer: &XmlSigner<'_>,
    ) -> SamlResult<String> {
        Self::encode(xml, destination, relay_state, message_type, Some(signer))
    }

    fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        signer: Option<&XmlSigner<'_>>,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

        let mut query = format!(
            "{}={}",
            message_type.form_param(),
            urlencoding::encode(&encoded)
        );
        if let Some(rs) = relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }
        if let Some(signer) = signer {
            query.push_str(&format!(
                "&SigAlg={}",
                urlencoding::encode(signer.algorithm_uri())
            ));
            let signature = signer.sign_redirect_binding(&query)?;
            query.push_str(&format!("&Signature={}", urlencoding::encode(&signature)));
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a SAML message from HTTP-Redirect query parameters.
    ///
    /// Values are expected URL-decoded, as a web framework hands them over.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
        signature: Option<&str>,
        sig_alg: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = if let Some(req) = saml_request {
            (req, SamlMessageType::Request)
        } else if let Some(resp) = saml_response {
            (resp, SamlMessageType::Response)
        } else {
            return Err(SamlError::InvalidBinding(
                "no SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };

        // A literal '+' left unescaped by the sender arrives as a space.
        let encoded = encoded.trim().replace(' ', "+");
        let b64_decoded = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        let xml_bytes = deflate_decompress(&b64_decoded)?;
        let xml = String::from_utf8(xml_bytes)
            .map_err(|e| SamlError::InvalidBinding(format!("invalid UTF-8 in message: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(String::from),
            signature: signature.map(String::from),
            sig_alg: sig_alg.map(String::from),
            signed_query: None,
        })
    }

    /// Decodes a message from a full URL.
    ///
    /// When the URL carries a `Signature`, the raw signed query is kept in
    /// [`DecodedMessage::signed_query`].
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidBinding(format!("invalid URL: {e}")))?;

        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;
        let mut signature = None;
        let mut sig_alg = None;

        for (key, value) in parsed.query_pairs() {
            let slot = match key.as_ref() {
                "SAMLRequest" => &mut saml_request,
                "SAMLResponse" => &mut saml_response,
                "RelayState" => &mut relay_state,
                "Signature" => &mut signature,
                "SigAlg" => &mut sig_alg,
                _ => continue,
            };
            if slot.replace(value.into_owned()).is_some() {
                return Err(SamlError::InvalidBinding(format!("duplicate {key} parameter")));
            }
        }

        let mut decoded = Self::decode(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
            signature.as_deref(),
            sig_alg.as_deref(),
        )?;
        if decoded.signature.is_some() {
            decoded.signed_query = Some(Self::extract_signed_query(url)?);
        }
        Ok(decoded)
    }

    /// Extracts the query string for signature verification.
    ///
    /// Returns the raw `SAMLRequest`/`SAMLResponse`, `RelayState` (if
    /// present) and `SigAlg` parameters, in that order, without re-encoding.
    pub fn extract_signed_query(url: &str) -> SamlResult<String> {
        let query = url
            .split_once('?')
            .map(|(_, q)| q.split('#').next().unwrap_or_default())
            .ok_or_else(|| SamlError::InvalidBinding("URL has no query".to_string()))?;

        let raw = |name: &str| {
            query
                .split('&')
                .find(|pair| pair.split_once('=').map_or(*pair, |(k, _)| k) == name)
        };

        let message = raw("SAMLRequest")
            .or_else(|| raw("SAMLResponse"))
            .ok_or_else(|| SamlError::InvalidBinding("no SAML parameter in query".to_string()))?;
        let sig_alg =
            raw("SigAlg").ok_or_else(|| SamlError::InvalidBinding("no SigAlg in query".to_string()))?;

        let mut parts = vec![message];
        parts.extend(raw("RelayState"));
        parts.push(sig_alg);
        Ok(parts.join("&"))
    }
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("compression finish error: {e}")))
}

/// Decompresses DEFLATE data, refusing output larger than [`MAX_INFLATED_LEN`].
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data).take(MAX_INFLATED_LEN + 1);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("decompression error: {e}")))?;
    if decompressed.len() as u64 > MAX_INFLATED_LEN {
        return Err(SamlError::Deflate("inflated message too large".to_string()));
    }
    Ok(decompressed)
}
