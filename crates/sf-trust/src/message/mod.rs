//! Signing and verification of protocol messages.
//!
//! [`MessageBuilder`] turns protocol types into signed, binding-encoded
//! [`OutboundMessage`](sf_saml::bindings::OutboundMessage)s. [`MessageValidator`]
//! holds the checks an inbound message goes through once its issuer is known:
//! signatures against the issuer's metadata certificates, timing and audience.

mod builder;
mod validator;

pub use builder::MessageBuilder;
pub use validator::MessageValidator;

use sf_saml::SamlError;

use crate::error::{FederationError, ProtocolError, TrustError};

/// Maps a decoding or parsing error to the federation taxonomy.
pub(crate) fn inbound_error(err: SamlError) -> FederationError {
    if err.is_signature_failure() {
        TrustError::UntrustedMessage(err.to_string()).into()
    } else {
        ProtocolError::MalformedMessage(err.to_string()).into()
    }
}
