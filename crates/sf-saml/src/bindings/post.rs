//! HTTP-POST binding: a base64 form field plus an auto-submitting page.

use base64::Engine;

use crate::error::{SamlError, SamlResult};

use super::{DecodedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Base64-encodes a message for the `SAMLRequest`/`SAMLResponse` form field.
    #[must_use]
    pub fn encode_value(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml)
    }

    /// Renders the page that posts an encoded message to `destination`.
    #[must_use]
    pub fn form(
        encoded: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let mut fields = hidden_input(message_type.form_param(), encoded);
        if let Some(relay_state) = relay_state {
            fields.push_str(&hidden_input("RelayState", relay_state));
        }
        format!(
            concat!(
                "<!DOCTYPE html>\n",
                "<html><head><meta charset=\"UTF-8\"><title>Continue</title></head>\n",
                "<body onload=\"document.forms[0].submit()\">\n",
                "<form method=\"post\" action=\"{action}\">{fields}",
                "<noscript><button type=\"submit\">Continue</button></noscript>",
                "</form>\n</body></html>\n",
            ),
            action = html_escape(destination),
            fields = fields,
        )
    }

    /// Decodes a posted form field.
    ///
    /// Whitespace inside the value is ignored since senders often wrap it.
    pub fn decode(
        encoded: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(SamlError::InvalidBinding(format!(
                "empty {} parameter",
                message_type.form_param()
            )));
        }
        let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
        let xml = String::from_utf8(bytes)
            .map_err(|e| SamlError::InvalidBinding(format!("message is not UTF-8: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(String::from),
            signature: None,
            sig_alg: None,
            signed_query: None,
        })
    }
}

fn hidden_input(name: &str, value: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
        name,
        html_escape(value)
    )
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(html: &'a str, name: &str) -> &'a str {
        let marker = format!("name=\"{name}\" value=\"");
        let start = html.find(&marker).unwrap() + marker.len();
        let end = html[start..].find('"').unwrap();
        &html[start..start + end]
    }

    #[test]
    fn form_carries_message_and_relay_state() {
        let xml = "<samlp:Response/>";
        let html = HttpPostBinding::form(
            &HttpPostBinding::encode_value(xml),
            "https://sp.example.org/sp/post",
            Some("tok&1"),
            SamlMessageType::Response,
        );
        assert!(html.contains("action=\"https://sp.example.org/sp/post\""));
        assert_eq!(field(&html, "RelayState"), "tok&amp;1");

        let decoded =
            HttpPostBinding::decode(field(&html, "SAMLResponse"), SamlMessageType::Response, None)
                .unwrap();
        assert_eq!(decoded.xml, xml);
    }

    #[test]
    fn form_without_relay_state_has_no_field() {
        let html = HttpPostBinding::form("PHgvPg==", "https://idp.example.org", None, SamlMessageType::Request);
        assert!(html.contains("name=\"SAMLRequest\""));
        assert!(!html.contains("RelayState"));
    }

    #[test]
    fn wrapped_value_decodes() {
        let encoded = HttpPostBinding::encode_value("<samlp:Response/>");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{head}\r\n{tail}");
        let decoded = HttpPostBinding::decode(&wrapped, SamlMessageType::Response, None).unwrap();
        assert_eq!(decoded.xml, "<samlp:Response/>");
    }

    #[test]
    fn garbage_is_a_base64_error() {
        let result = HttpPostBinding::decode("!!not base64!!", SamlMessageType::Response, None);
        assert!(matches!(result, Err(SamlError::Base64Decode(_))));
    }

    #[test]
    fn empty_value_is_rejected() {
        let result = HttpPostBinding::decode("  ", SamlMessageType::Request, None);
        assert!(matches!(result, Err(SamlError::InvalidBinding(_))));
    }

    #[test]
    fn destination_is_escaped() {
        let html = HttpPostBinding::form("x", "https://e.org/?a=\"><script>", None, SamlMessageType::Request);
        assert!(!html.contains("<script>"));
    }
}
