//! SAML 2.0 building blocks for the federation engine.
//!
//! This crate knows the wire formats and nothing about trust decisions:
//!
//! - **XML tree and exclusive canonicalization** - [`xml`]
//! - **Metadata codec** - `md:EntityDescriptor` with IdP and SP descriptors
//! - **Protocol messages** - AuthnRequest, Response and Assertion
//! - **XML signature** - enveloped XML-DSig signing and validation
//! - **POST and Redirect bindings** - including signed redirect queries
//!
//! # Architecture
//!
//! - [`types`] - Core SAML types and data structures
//! - [`metadata`] - Metadata model and codec
//! - [`signature`] - XML signature signing and validation
//! - [`bindings`] - POST and Redirect binding implementations
//! - [`error`] - Error types for SAML operations
//!
//! Key material never enters this crate; signing and verification go
//! through an [`sf_crypto::CryptoCapability`].
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod error;
pub mod metadata;
pub mod signature;
pub mod types;
pub mod xml;

pub use error::{SamlError, SamlResult};
pub use types::*;

#[cfg(test)]
pub(crate) mod test_support {
    use sf_crypto::{Certificate, KeyPairCapability, SigningKey};

    /// A P-256 key pair with a self-signed certificate for `host`.
    pub(crate) fn capability(host: &str) -> KeyPairCapability {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec![host.to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        KeyPairCapability::new(
            SigningKey::from_der(&key_pair.serialize_der()).unwrap(),
            Certificate::from_der(cert.der()).unwrap(),
        )
        .unwrap()
    }
}
