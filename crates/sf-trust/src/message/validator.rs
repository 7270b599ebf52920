use chrono::{DateTime, Utc};
use sf_crypto::{Certificate, CryptoCapability};
use sf_saml::bindings::DecodedMessage;
use sf_saml::signature::{is_signed, XmlSignatureValidator};
use sf_saml::xml::XmlElement;
use sf_saml::{Assertion, Response, SAML_NS};

use crate::error::{FederationResult, ProtocolError, TrustError};

/// Checks an inbound message against its issuer's metadata.
pub struct MessageValidator<'a> {
    crypto: &'a dyn CryptoCapability,
    certificates: Vec<Certificate>,
    now: DateTime<Utc>,
    skew: chrono::Duration,
}

impl<'a> MessageValidator<'a> {
    /// Creates a validator trusting the issuer's `certificates` at `now`.
    #[must_use]
    pub fn new(
        crypto: &'a dyn CryptoCapability,
        certificates: Vec<Certificate>,
        now: DateTime<Utc>,
        skew: chrono::Duration,
    ) -> Self {
        Self {
            crypto,
            certificates,
            now,
            skew,
        }
    }

    fn signatures(&self) -> XmlSignatureValidator<'_> {
        XmlSignatureValidator::new(self.crypto, &self.certificates, self.now)
    }

    /// Verifies the enveloped signature of the element with `ID` = `id`.
    pub fn verify_element(&self, root: &XmlElement, id: &str) -> FederationResult<()> {
        self.signatures()
            .validate(root, id)
            .map(|_| ())
            .map_err(|e| TrustError::UntrustedMessage(e.to_string()).into())
    }

    /// Verifies the query signature of an HTTP-Redirect message.
    pub fn verify_redirect(&self, message: &DecodedMessage) -> FederationResult<()> {
        let (Some(query), Some(signature), Some(sig_alg)) = (
            message.signed_query.as_deref(),
            message.signature.as_deref(),
            message.sig_alg.as_deref(),
        ) else {
            return Err(TrustError::UntrustedMessage("redirect message is not signed".to_string()).into());
        };
        self.signatures()
            .validate_redirect_binding(query, signature, sig_alg)
            .map_err(|e| TrustError::UntrustedMessage(e.to_string()).into())
    }

    /// Verifies a Response's signatures.
    ///
    /// The Response is trusted when its root carries a valid signature or,
    /// failing that, every assertion does. With `require_signed_assertions`
    /// each assertion must be signed regardless.
    pub fn verify_response(
        &self,
        root: &XmlElement,
        response: &Response,
        require_signed_assertions: bool,
    ) -> FederationResult<()> {
        let assertion_elements: Vec<&XmlElement> = root.children_named(SAML_NS, "Assertion").collect();
        let root_signed = is_signed(root);
        if root_signed {
            self.verify_element(root, &response.id)?;
        }
        let check_assertions = require_signed_assertions || !root_signed;
        if check_assertions {
            if assertion_elements.is_empty() {
                return Err(TrustError::UntrustedMessage("response is not signed".to_string()).into());
            }
            for (element, assertion) in assertion_elements.iter().zip(&response.assertions) {
                if !is_signed(element) {
                    return Err(TrustError::UntrustedMessage(format!(
                        "assertion {} is not signed",
                        assertion.id
                    ))
                    .into());
                }
                self.verify_element(root, &assertion.id)?;
            }
        }
        Ok(())
    }

    /// Rejects messages issued too long ago or too far in the future.
    pub fn check_issue_instant(
        &self,
        issued: DateTime<Utc>,
        max_age: chrono::Duration,
    ) -> FederationResult<()> {
        if issued > self.now + self.skew {
            return Err(ProtocolError::ExpiredMessage(format!("issued in the future at {issued}")).into());
        }
        if self.now - self.skew >= issued + max_age {
            return Err(ProtocolError::ExpiredMessage(format!("issued at {issued}, too old")).into());
        }
        Ok(())
    }

    /// Checks the assertion's validity window and bearer confirmation.
    pub fn check_conditions(&self, assertion: &Assertion) -> FederationResult<()> {
        if let Some(conditions) = &assertion.conditions {
            if !conditions.is_valid_at(self.now, self.skew) {
                return Err(ProtocolError::ExpiredMessage(format!(
                    "assertion {} is outside its validity window",
                    assertion.id
                ))
                .into());
            }
        }
        let bearer = assertion
            .subject
            .iter()
            .flat_map(|s| &s.subject_confirmations)
            .find(|c| c.is_bearer())
            .ok_or_else(|| {
                ProtocolError::MalformedMessage(format!(
                    "assertion {} has no bearer confirmation",
                    assertion.id
                ))
            })?;
        let expired = bearer
            .subject_confirmation_data
            .as_ref()
            .and_then(|d| d.not_on_or_after)
            .is_some_and(|until| self.now - self.skew >= until);
        if expired {
            return Err(ProtocolError::ExpiredMessage(format!(
                "bearer confirmation of assertion {} has expired",
                assertion.id
            ))
            .into());
        }
        Ok(())
    }

    /// Checks that the assertion is meant for `entity_id` at `acs_url`.
    pub fn check_audience(
        &self,
        assertion: &Assertion,
        entity_id: &str,
        acs_url: &str,
    ) -> FederationResult<()> {
        let admitted = assertion
            .conditions
            .as_ref()
            .is_some_and(|c| !c.audience_restrictions.is_empty() && c.admits(entity_id));
        if !admitted {
            return Err(ProtocolError::AudienceMismatch(format!(
                "{entity_id} is not an audience of assertion {}",
                assertion.id
            ))
            .into());
        }
        let recipient = assertion
            .subject
            .iter()
            .flat_map(|s| &s.subject_confirmations)
            .filter(|c| c.is_bearer())
            .find_map(|c| c.subject_confirmation_data.as_ref()?.recipient.as_deref());
        if let Some(recipient) = recipient {
            if recipient != acs_url {
                return Err(ProtocolError::AudienceMismatch(format!(
                    "recipient {recipient} is not {acs_url}"
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::message::MessageBuilder;
    use crate::test_support::capability;
    use sf_saml::{Conditions, NameId, Subject, SubjectConfirmation, SubjectConfirmationData};

    const IDP: &str = "https://idp.example.org";
    const SP: &str = "https://sp.example.org";
    const ACS: &str = "https://sp.example.org/sp/post";

    fn assertion(now: DateTime<Utc>) -> Assertion {
        let until = now + chrono::Duration::seconds(300);
        Assertion::new(IDP)
            .issued_at(now)
            .with_subject(
                Subject::new(NameId::persistent("user-1")).with_confirmation(
                    SubjectConfirmation::bearer()
                        .with_data(SubjectConfirmationData::for_request(None, ACS, until)),
                ),
            )
            .with_conditions(Conditions::valid_for(now, chrono::Duration::seconds(300)).with_audience(SP))
    }

    fn validator<'a>(
        crypto: &'a dyn CryptoCapability,
        trusted: Vec<Certificate>,
        now: DateTime<Utc>,
    ) -> MessageValidator<'a> {
        MessageValidator::new(crypto, trusted, now, chrono::Duration::seconds(60))
    }

    fn signed_response(
        crypto: &dyn CryptoCapability,
        sign_assertions: bool,
    ) -> (XmlElement, Response) {
        let response = Response::success(IDP)
            .with_destination(ACS)
            .with_assertion(assertion(Utc::now()));
        let outbound = MessageBuilder::new(crypto)
            .response(&response, sign_assertions, None)
            .unwrap();
        let xml = outbound.to_inbound().decode().unwrap().xml;
        let root = XmlElement::parse(&xml).unwrap();
        let parsed = Response::from_xml(&root).unwrap();
        (root, parsed)
    }

    #[test]
    fn signed_response_verifies() {
        let idp = capability("idp.example.org");
        let (root, response) = signed_response(&idp, false);
        let v = validator(&idp, vec![idp.certificate().clone()], Utc::now());
        v.verify_response(&root, &response, false).unwrap();
    }

    #[test]
    fn unsigned_assertions_fail_when_required() {
        let idp = capability("idp.example.org");
        let (root, response) = signed_response(&idp, false);
        let v = validator(&idp, vec![idp.certificate().clone()], Utc::now());
        assert!(matches!(
            v.verify_response(&root, &response, true),
            Err(FederationError::Trust(TrustError::UntrustedMessage(_)))
        ));

        let (root, response) = signed_response(&idp, true);
        v.verify_response(&root, &response, true).unwrap();
    }

    #[test]
    fn foreign_key_is_untrusted() {
        let idp = capability("idp.example.org");
        let other = capability("other.example.org");
        let (root, response) = signed_response(&idp, false);
        let v = validator(&idp, vec![other.certificate().clone()], Utc::now());
        assert!(matches!(
            v.verify_response(&root, &response, false),
            Err(FederationError::Trust(TrustError::UntrustedMessage(_)))
        ));
    }

    #[test]
    fn conditions_window_with_skew() {
        let idp = capability("idp.example.org");
        let issued = Utc::now();
        let assertion = assertion(issued);

        let inside = issued + chrono::Duration::seconds(299);
        validator(&idp, Vec::new(), inside).check_conditions(&assertion).unwrap();

        // NotOnOrAfter + 60s skew
        let past = issued + chrono::Duration::seconds(361);
        assert!(matches!(
            validator(&idp, Vec::new(), past).check_conditions(&assertion),
            Err(FederationError::Protocol(ProtocolError::ExpiredMessage(_)))
        ));
    }

    #[test]
    fn audience_and_recipient_are_checked() {
        let idp = capability("idp.example.org");
        let now = Utc::now();
        let v = validator(&idp, Vec::new(), now);
        let assertion = assertion(now);

        v.check_audience(&assertion, SP, ACS).unwrap();
        assert!(matches!(
            v.check_audience(&assertion, "https://evil.example.org", ACS),
            Err(FederationError::Protocol(ProtocolError::AudienceMismatch(_)))
        ));
        assert!(v.check_audience(&assertion, SP, "https://sp.example.org/other").is_err());
    }

    #[test]
    fn issue_instant_age() {
        let idp = capability("idp.example.org");
        let now = Utc::now();
        let v = validator(&idp, Vec::new(), now);
        let max_age = chrono::Duration::seconds(300);

        v.check_issue_instant(now - chrono::Duration::seconds(100), max_age).unwrap();
        assert!(v.check_issue_instant(now - chrono::Duration::seconds(400), max_age).is_err());
        assert!(v.check_issue_instant(now + chrono::Duration::seconds(120), max_age).is_err());
    }
}
