//! XML Signature support for SAML.
//!
//! This module provides XML Digital Signature (XML-DSig) support for
//! signing and validating SAML messages, assertions and metadata.
//!
//! Only enveloped signatures are produced or accepted: the `ds:Signature`
//! is a child of the element it signs and its single `Reference` points at
//! that element's `ID`. References are canonicalized with exclusive C14N
//! (no comments) and digested with SHA-2.
//!
//! Signing and verification delegate the raw operations to a
//! [`sf_crypto::CryptoCapability`].

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use base64::Engine;
use sf_crypto::{Certificate, DigestAlgorithm, SignatureAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, transforms, XMLDSIG_NS};
use crate::xml::XmlElement;

/// A parsed `<ds:Signature>` element.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// The `SignedInfo` canonicalization method URI.
    pub canonicalization: String,
    /// The reference URI (`#` followed by the signed element's ID).
    pub reference_uri: String,
    /// Transform URIs applied to the reference.
    pub transforms: Vec<String>,
    /// The digest algorithm of the reference.
    pub digest_algorithm: DigestAlgorithm,
    /// The decoded digest value.
    pub digest_value: Vec<u8>,
    /// The decoded signature value.
    pub signature_value: Vec<u8>,
    /// Certificate carried in `KeyInfo`, if any. Never trusted on its own.
    pub certificate: Option<Certificate>,
}

impl XmlSignature {
    /// Reads a `ds:Signature` element.
    ///
    /// Exactly one `Reference` is required.
    pub fn from_xml(signature: &XmlElement) -> SamlResult<Self> {
        let signed_info = signature.required_child(XMLDSIG_NS, "SignedInfo")?;

        let canonicalization = signed_info
            .required_child(XMLDSIG_NS, "CanonicalizationMethod")?
            .required_attr("Algorithm")?
            .to_string();
        let algorithm = SignatureAlgorithm::from_uri(
            signed_info
                .required_child(XMLDSIG_NS, "SignatureMethod")?
                .required_attr("Algorithm")?,
        )
        .map_err(|e| SamlError::SignatureInvalid(e.to_string()))?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references
            .next()
            .ok_or_else(|| SamlError::SignatureInvalid("SignedInfo has no Reference".to_string()))?;
        if references.next().is_some() {
            return Err(SamlError::SignatureInvalid(
                "SignedInfo has more than one Reference".to_string(),
            ));
        }

        let transforms = reference
            .child(XMLDSIG_NS, "Transforms")
            .map(|t| {
                t.children_named(XMLDSIG_NS, "Transform")
                    .map(|t| t.required_attr("Algorithm").map(String::from))
                    .collect::<SamlResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        let digest_algorithm = DigestAlgorithm::from_uri(
            reference
                .required_child(XMLDSIG_NS, "DigestMethod")?
                .required_attr("Algorithm")?,
        )
        .map_err(|e| SamlError::SignatureInvalid(e.to_string()))?;

        let certificate = signature
            .child(XMLDSIG_NS, "KeyInfo")
            .and_then(|k| k.child(XMLDSIG_NS, "X509Data"))
            .and_then(|d| d.child_text(XMLDSIG_NS, "X509Certificate"))
            .map(|b64| Certificate::from_base64(&b64))
            .transpose()?;

        Ok(Self {
            algorithm,
            canonicalization,
            reference_uri: reference.attr("URI").unwrap_or_default().to_string(),
            transforms,
            digest_algorithm,
            digest_value: decode_b64(&reference.child_text(XMLDSIG_NS, "DigestValue").ok_or_else(
                || SamlError::SignatureInvalid("Reference has no DigestValue".to_string()),
            )?)?,
            signature_value: decode_b64(
                &signature
                    .child_text(XMLDSIG_NS, "SignatureValue")
                    .ok_or_else(|| SamlError::SignatureInvalid("no SignatureValue".to_string()))?,
            )?,
            certificate,
        })
    }

    /// Checks that only exclusive C14N and the enveloped transform are used.
    pub fn check_profile(&self) -> SamlResult<()> {
        if self.canonicalization != canonicalization_algorithms::EXCLUSIVE_C14N {
            return Err(SamlError::SignatureInvalid(format!(
                "unsupported canonicalization: {}",
                self.canonicalization
            )));
        }
        for transform in &self.transforms {
            if transform != transforms::ENVELOPED_SIGNATURE
                && transform != canonicalization_algorithms::EXCLUSIVE_C14N
            {
                return Err(SamlError::SignatureInvalid(format!(
                    "unsupported transform: {transform}"
                )));
            }
        }
        Ok(())
    }
}

/// Returns whether `element` carries a direct `ds:Signature` child.
#[must_use]
pub fn is_signed(element: &XmlElement) -> bool {
    element.child(XMLDSIG_NS, "Signature").is_some()
}

fn decode_b64(value: &str) -> SamlResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| SamlError::SignatureInvalid(format!("invalid base64: {e}")))
}
