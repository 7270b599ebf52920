//! XML Signature validation.
//!
//! Provides functionality for validating signatures on SAML documents.

use std::collections::HashSet;

use base64::Engine;
use chrono::{DateTime, Utc};
use sf_crypto::hash::{digests_match, hash};
use sf_crypto::{Certificate, CryptoCapability, SignatureAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::types::XMLDSIG_NS;
use crate::xml::XmlElement;

use super::XmlSignature;

/// XML signature validator.
///
/// Validates signatures on SAML documents against a set of trusted
/// certificates, normally the signing certificates from the issuer's
/// metadata. Certificates embedded in the signature are ignored.
pub struct XmlSignatureValidator<'a> {
    crypto: &'a dyn CryptoCapability,
    trusted_certificates: &'a [Certificate],
    now: DateTime<Utc>,
}

impl<'a> XmlSignatureValidator<'a> {
    /// Creates a validator trusting `trusted_certificates` at `now`.
    #[must_use]
    pub fn new(
        crypto: &'a dyn CryptoCapability,
        trusted_certificates: &'a [Certificate],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            crypto,
            trusted_certificates,
            now,
        }
    }

    /// Validates the enveloped signature of the element with `ID` = `id` in `document`.
    ///
    /// Fails when the document contains duplicate IDs, when the element is
    /// unsigned, when the reference does not point at the element itself,
    /// when the digest does not match, or when no trusted certificate that
    /// is currently valid verifies the signature.
    pub fn validate(&self, document: &XmlElement, id: &str) -> SamlResult<XmlSignature> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = document.ids().into_iter().find(|id| !seen.insert(*id)) {
            return Err(SamlError::SignatureInvalid(format!(
                "duplicate ID '{duplicate}' in document"
            )));
        }

        let (element, inherited) = document
            .find_by_id(id)
            .ok_or_else(|| SamlError::SignatureInvalid(format!("no element with ID '{id}'")))?;
        let signature_element = element
            .child(XMLDSIG_NS, "Signature")
            .ok_or_else(|| SamlError::SignatureInvalid(format!("element '{id}' is not signed")))?;
        let signature = XmlSignature::from_xml(signature_element)?;
        signature.check_profile()?;

        if signature.reference_uri != format!("#{id}") {
            return Err(SamlError::SignatureInvalid(format!(
                "reference '{}' does not point at the signed element",
                signature.reference_uri
            )));
        }

        let mut unsigned = element.clone();
        unsigned.remove_children(XMLDSIG_NS, "Signature");
        let digest = hash(
            signature.digest_algorithm,
            unsigned.canonicalize(&inherited)?.as_bytes(),
        );
        if !digests_match(&signature.digest_value, &digest) {
            return Err(SamlError::SignatureInvalid("digest mismatch".to_string()));
        }

        let signed_info = signature_element.required_child(XMLDSIG_NS, "SignedInfo")?;
        let mut scope = element.scope_for_children(&inherited);
        scope.extend(signature_element.namespace_decls.iter().cloned());
        let canonical = signed_info.canonicalize(&scope)?;

        self.verify_with_trusted(
            canonical.as_bytes(),
            &signature.signature_value,
            signature.algorithm,
        )?;
        Ok(signature)
    }

    /// Validates a detached signature for HTTP-Redirect binding.
    ///
    /// `signed_query` is the raw query substring the signature covers.
    pub fn validate_redirect_binding(
        &self,
        signed_query: &str,
        signature_b64: &str,
        sig_alg: &str,
    ) -> SamlResult<()> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg)
            .map_err(|e| SamlError::SignatureInvalid(e.to_string()))?;
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature_b64.trim())
            .map_err(|e| SamlError::SignatureInvalid(format!("invalid signature encoding: {e}")))?;
        self.verify_with_trusted(signed_query.as_bytes(), &signature, algorithm)
    }

    fn verify_with_trusted(
        &self,
        data: &[u8],
        signature: &[u8],
        algorithm: SignatureAlgorithm,
    ) -> SamlResult<()> {
        let mut candidates = 0usize;
        for certificate in self.trusted_certificates {
            if !self.crypto.certificate_valid(certificate, self.now) {
                tracing::debug!(
                    subject = %certificate.subject(),
                    "skipping certificate outside its validity window"
                );
                continue;
            }
            candidates += 1;
            match self.crypto.verify(data, signature, certificate, algorithm) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(
                        subject = %certificate.subject(),
                        error = %e,
                        "certificate cannot verify signature"
                    );
                }
            }
        }

        if candidates == 0 {
            return Err(SamlError::SignatureInvalid(
                "no trusted certificate is currently valid".to_string(),
            ));
        }
        Err(SamlError::SignatureInvalid(
            "signature verification failed with all trusted certificates".to_string(),
        ))
    }
}
