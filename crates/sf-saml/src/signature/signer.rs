//! XML Signature creation.
//!
//! Provides functionality for signing SAML documents using XML-DSig.

use base64::Engine;
use sf_crypto::{hash::hash, CryptoCapability};

use crate::error::SamlResult;
use crate::types::{canonicalization_algorithms, transforms, SAML_NS, XMLDSIG_NS};
use crate::xml::XmlElement;

/// XML document signer.
///
/// Signs SAML elements with the key held by a [`CryptoCapability`].
pub struct XmlSigner<'a> {
    crypto: &'a dyn CryptoCapability,
}

impl<'a> XmlSigner<'a> {
    /// Creates a signer over the given capability.
    #[must_use]
    pub fn new(crypto: &'a dyn CryptoCapability) -> Self {
        Self { crypto }
    }

    /// Signs `element` in place with an enveloped signature.
    ///
    /// The element must carry an `ID` attribute and declare every namespace
    /// prefix it uses. `inherited` holds the declarations of the ancestors
    /// the element will be embedded in; pass an empty slice for a document
    /// root or for an element signed before it is embedded.
    ///
    /// The `ds:Signature` is inserted right after `saml:Issuer` when present,
    /// otherwise as the first child. An existing signature is replaced.
    pub fn sign(
        &self,
        element: &mut XmlElement,
        inherited: &[(Option<String>, String)],
    ) -> SamlResult<()> {
        let id = element.required_attr("ID")?.to_string();
        element.remove_children(XMLDSIG_NS, "Signature");

        let algorithm = self.crypto.algorithm();
        let digest_algorithm = algorithm.digest();
        let digest = hash(digest_algorithm, element.canonicalize(inherited)?.as_bytes());

        let signed_info = XmlElement::new("ds:SignedInfo", XMLDSIG_NS)
            .with_child(
                XmlElement::new("ds:CanonicalizationMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
            )
            .with_child(
                XmlElement::new("ds:SignatureMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", algorithm.uri()),
            )
            .with_child(
                XmlElement::new("ds:Reference", XMLDSIG_NS)
                    .with_attr("URI", format!("#{id}"))
                    .with_child(
                        XmlElement::new("ds:Transforms", XMLDSIG_NS)
                            .with_child(
                                XmlElement::new("ds:Transform", XMLDSIG_NS)
                                    .with_attr("Algorithm", transforms::ENVELOPED_SIGNATURE),
                            )
                            .with_child(
                                XmlElement::new("ds:Transform", XMLDSIG_NS).with_attr(
                                    "Algorithm",
                                    canonicalization_algorithms::EXCLUSIVE_C14N,
                                ),
                            ),
                    )
                    .with_child(
                        XmlElement::new("ds:DigestMethod", XMLDSIG_NS)
                            .with_attr("Algorithm", digest_algorithm.uri()),
                    )
                    .with_child(
                        XmlElement::new("ds:DigestValue", XMLDSIG_NS)
                            .with_text(base64::engine::general_purpose::STANDARD.encode(digest)),
                    ),
            );

        let mut signature =
            XmlElement::new("ds:Signature", XMLDSIG_NS).with_namespace("ds", XMLDSIG_NS);
        let mut scope = element.scope_for_children(inherited);
        scope.extend(signature.namespace_decls.iter().cloned());
        let signature_value = self
            .crypto
            .sign(signed_info.canonicalize(&scope)?.as_bytes())?;

        signature = signature
            .with_child(signed_info)
            .with_child(
                XmlElement::new("ds:SignatureValue", XMLDSIG_NS)
                    .with_text(base64::engine::general_purpose::STANDARD.encode(signature_value)),
            )
            .with_child(
                XmlElement::new("ds:KeyInfo", XMLDSIG_NS).with_child(
                    XmlElement::new("ds:X509Data", XMLDSIG_NS).with_child(
                        XmlElement::new("ds:X509Certificate", XMLDSIG_NS)
                            .with_text(self.crypto.certificate().to_base64()),
                    ),
                ),
            );

        let position = element
            .position_of(SAML_NS, "Issuer")
            .map_or(0, |issuer| issuer + 1);
        element.insert_child(position, signature);
        tracing::debug!(id = %id, algorithm = ?algorithm, "signed element");
        Ok(())
    }

    /// Signs the octets of an HTTP-Redirect query and returns the base64 signature.
    ///
    /// `signed_query` is `SAMLRequest=…[&RelayState=…]&SigAlg=…` exactly as
    /// it is placed in the URL.
    pub fn sign_redirect_binding(&self, signed_query: &str) -> SamlResult<String> {
        let signature = self.crypto.sign(signed_query.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }

    /// Returns the signature algorithm URI used for the `SigAlg` parameter.
    #[must_use]
    pub fn algorithm_uri(&self) -> &'static str {
        self.crypto.algorithm().uri()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capability;
    use crate::types::{Assertion, NameId, Response, Subject};

    #[test]
    fn signature_goes_after_issuer() {
        let crypto = capability("idp.example.org");
        let mut element = Response::success("https://idp.example.org").to_xml();
        XmlSigner::new(&crypto).sign(&mut element, &[]).unwrap();

        let names: Vec<_> = element.elements().map(|e| e.local_name.as_str()).collect();
        assert_eq!(names, ["Issuer", "Signature", "Status"]);
    }

    #[test]
    fn signing_twice_keeps_one_signature() {
        let crypto = capability("idp.example.org");
        let signer = XmlSigner::new(&crypto);
        let mut element = Assertion::new("https://idp.example.org")
            .with_subject(Subject::new(NameId::persistent("u1")))
            .to_xml();
        signer.sign(&mut element, &[]).unwrap();
        signer.sign(&mut element, &[]).unwrap();
        assert_eq!(element.children_named(XMLDSIG_NS, "Signature").count(), 1);
    }

    #[test]
    fn signature_carries_certificate_and_reference() {
        let crypto = capability("idp.example.org");
        let mut element = Response::success("https://idp.example.org").to_xml();
        let id = element.attr("ID").unwrap().to_string();
        XmlSigner::new(&crypto).sign(&mut element, &[]).unwrap();

        let signature =
            super::super::XmlSignature::from_xml(element.child(XMLDSIG_NS, "Signature").unwrap())
                .unwrap();
        assert_eq!(signature.reference_uri, format!("#{id}"));
        assert_eq!(signature.certificate.as_ref(), Some(crypto.certificate()));
    }

    #[test]
    fn element_without_id_cannot_be_signed() {
        let crypto = capability("idp.example.org");
        let mut element = XmlElement::new("saml:Issuer", SAML_NS);
        assert!(XmlSigner::new(&crypto).sign(&mut element, &[]).is_err());
    }
}
