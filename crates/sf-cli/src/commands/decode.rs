//! Binding message decoding.

use serde::Serialize;
use sf_saml::bindings::{DecodedMessage, InboundMessage};

use crate::cli::DecodeCommand;
use crate::output::{field, output_single, OutputFormat};
use crate::CliResult;

/// A decoded message as printed by `sf decode`.
#[derive(Debug, Serialize)]
struct DecodedOutput {
    binding: &'static str,
    message_type: &'static str,
    relay_state: Option<String>,
    signed_query: bool,
    sig_alg: Option<String>,
    xml: String,
}

/// Runs a decode command.
pub fn run_decode(cmd: DecodeCommand, format: OutputFormat) -> CliResult<()> {
    let inbound = match cmd {
        DecodeCommand::Redirect { url } => InboundMessage::Redirect { url },
        DecodeCommand::Post {
            message,
            request: true,
            relay_state,
        } => InboundMessage::post_request(message, relay_state),
        DecodeCommand::Post {
            message,
            relay_state,
            ..
        } => InboundMessage::post_response(message, relay_state),
    };
    let output = describe(&inbound, inbound.decode()?);
    output_single(&output, format, |o| {
        field("binding", o.binding);
        field("message", o.message_type);
        if let Some(relay_state) = &o.relay_state {
            field("RelayState", relay_state);
        }
        if let Some(alg) = &o.sig_alg {
            field("SigAlg", alg);
        }
        println!();
        println!("{}", o.xml);
    })
}

fn describe(inbound: &InboundMessage, decoded: DecodedMessage) -> DecodedOutput {
    DecodedOutput {
        binding: match inbound {
            InboundMessage::Redirect { .. } => "HTTP-Redirect",
            InboundMessage::Post { .. } => "HTTP-POST",
        },
        message_type: decoded.message_type.form_param(),
        relay_state: decoded.relay_state,
        signed_query: decoded.signature.is_some(),
        sig_alg: decoded.sig_alg,
        xml: decoded.xml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_saml::bindings::HttpPostBinding;

    #[test]
    fn post_response_is_described() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1"/>"#;
        let inbound =
            InboundMessage::post_response(HttpPostBinding::encode_value(xml), Some("token".to_string()));
        let output = describe(&inbound, inbound.decode().unwrap());
        assert_eq!(output.binding, "HTTP-POST");
        assert_eq!(output.message_type, "SAMLResponse");
        assert_eq!(output.relay_state.as_deref(), Some("token"));
        assert!(!output.signed_query);
        assert!(output.xml.contains("_r1"));
    }

    #[test]
    fn garbage_is_an_error() {
        let cmd = DecodeCommand::Post {
            message: "not base64!".to_string(),
            request: false,
            relay_state: None,
        };
        assert!(run_decode(cmd, OutputFormat::Json).is_err());
    }
}
