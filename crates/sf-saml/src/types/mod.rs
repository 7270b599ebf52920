//! SAML 2.0 types and data structures.
//!
//! This module contains the protocol messages exchanged during web SSO:
//! authentication requests, responses, assertions, and related structures.
//! Every message type converts to and from an [`XmlElement`] tree.

mod assertion;
mod authn_request;
mod constants;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use crate::error::{SamlError, SamlResult};
use crate::xml::XmlElement;

pub(crate) fn issuer_element(issuer: &str) -> XmlElement {
    XmlElement::new("saml:Issuer", SAML_NS).with_text(issuer)
}

pub(crate) fn read_issuer(element: &XmlElement) -> SamlResult<String> {
    element
        .child_text(SAML_NS, "Issuer")
        .filter(|issuer| !issuer.is_empty())
        .ok_or_else(|| SamlError::MissingElement(format!("Issuer in {}", element.qname())))
}
