//! Federation error taxonomy.
//!
//! Errors fall into families a host can react to differently: configuration
//! mistakes, trust failures, protocol violations, attribute resolution
//! failures and RelayState problems. Messages name the entity or message
//! involved but never carry key material or user attributes.

use std::fmt;

use sf_saml::types::{status_codes, sub_status_codes};
use thiserror::Error;

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

/// Top-level federation error.
#[derive(Debug, Error)]
pub enum FederationError {
    /// The authority or one of its roles is misconfigured.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A partner or message could not be trusted.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// A message violates the protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Attribute values could not be resolved.
    #[error("attribute resolution failed: {0}")]
    Attributes(AttributeErrors),

    /// RelayState lookup or storage failed.
    #[error(transparent)]
    RelayState(#[from] RelayStateError),
}

/// Error family, for logging and mapping to host responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`ConfigurationError`].
    Configuration,
    /// See [`TrustError`].
    Trust,
    /// See [`ProtocolError`].
    Protocol,
    /// See [`AttributeError`].
    Attributes,
    /// See [`RelayStateError`].
    RelayState,
}

impl ErrorKind {
    /// Returns the family name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Trust => "trust",
            Self::Protocol => "protocol",
            Self::Attributes => "attributes",
            Self::RelayState => "relay_state",
        }
    }
}

impl FederationError {
    /// Returns the error family.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Trust(_) => ErrorKind::Trust,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Attributes(_) => ErrorKind::Attributes,
            Self::RelayState(_) => ErrorKind::RelayState,
        }
    }

    /// Returns the top-level SAML status code an IdP reports for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::Trust(_)
            | Self::Protocol(
                ProtocolError::InvalidNameIdPolicy(_)
                | ProtocolError::ExpiredMessage(_)
                | ProtocolError::MalformedMessage(_)
                | ProtocolError::InvalidRequest(_),
            ) => status_codes::REQUESTER,
            _ => status_codes::RESPONDER,
        }
    }

    /// Returns the second-level SAML status code, if one fits.
    #[must_use]
    pub const fn sub_status_code(&self) -> Option<&'static str> {
        match self {
            Self::Protocol(ProtocolError::InvalidNameIdPolicy(_)) => {
                Some(sub_status_codes::INVALID_NAMEID_POLICY)
            }
            Self::Configuration(ConfigurationError::UndefinedServiceIndex(_)) => {
                Some(sub_status_codes::RESOURCE_NOT_RECOGNIZED)
            }
            Self::Trust(_) => Some(sub_status_codes::REQUEST_DENIED),
            _ => None,
        }
    }

    /// Returns whether the error is the caller's fault rather than ours.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Trust(_)
                | Self::Protocol(_)
                | Self::RelayState(RelayStateError::NotFound | RelayStateError::IssuerMismatch { .. })
        )
    }
}

impl From<AttributeErrors> for FederationError {
    fn from(errors: AttributeErrors) -> Self {
        Self::Attributes(errors)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A role of this kind is already registered with the authority.
    #[error("a {0} role is already registered")]
    AlreadyRegistered(&'static str),

    /// The authority cannot be located.
    #[error("authority not found: {0}")]
    AuthorityNotFound(String),

    /// An authority already exists for the trust domain.
    #[error("authority already exists: {0}")]
    AuthorityExists(String),

    /// The authority still has registered roles.
    #[error("authority still has registered roles: {}", .0.join(", "))]
    DependentRoles(Vec<String>),

    /// Metadata cannot be published without a role.
    #[error("the authority has no registered roles; its metadata would be invalid")]
    NoRolesRegistered,

    /// The entity is the authority itself.
    #[error("entity {0} is protected")]
    ProtectedEntity(String),

    /// No index was given and no service is marked as default.
    #[error("no default attribute consuming service is defined")]
    NoDefaultDefined,

    /// The index names no attribute consuming service.
    #[error("attribute consuming service {0} is not defined")]
    UndefinedServiceIndex(u16),

    /// Two attribute consuming services share an index.
    #[error("attribute consuming service index {0} is used more than once")]
    DuplicateServiceIndex(u16),

    /// More than one attribute consuming service is marked as default.
    #[error("more than one attribute consuming service is marked as default")]
    MultipleDefaultServices,

    /// Any other invalid setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<sf_core::Error> for ConfigurationError {
    fn from(err: sf_core::Error) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<sf_core::Error> for FederationError {
    fn from(err: sf_core::Error) -> Self {
        Self::Configuration(err.into())
    }
}

/// Trust errors.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The entity was never registered and has no fetch source.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A metadata document is malformed.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The entity's metadata expired and could not be refreshed.
    #[error("metadata for {0} has expired")]
    ExpiredMetadata(String),

    /// An explicit refresh could not fetch metadata.
    #[error("metadata for {entity_id} is unavailable: {reason}")]
    MetadataUnavailable {
        /// The entity whose metadata was requested.
        entity_id: String,
        /// Why the fetch failed.
        reason: String,
    },

    /// A message signature is missing or does not verify.
    #[error("untrusted message: {0}")]
    UntrustedMessage(String),
}

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message cannot be decoded or parsed.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The message is outside its validity window.
    #[error("expired message: {0}")]
    ExpiredMessage(String),

    /// The local entity is not among the audiences.
    #[error("audience mismatch: {0}")]
    AudienceMismatch(String),

    /// No unconsumed RelayState record matches the response.
    #[error("unknown or replayed response")]
    UnknownOrReplayedResponse,

    /// The response carries a non-success status.
    #[error("unsuccessful status {code}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    UnsuccessfulStatus {
        /// The innermost status code.
        code: String,
        /// The status message, if any.
        message: Option<String>,
    },

    /// The requested name ID format is not supported.
    #[error("unsupported name ID format: {0}")]
    InvalidNameIdPolicy(String),

    /// The request is well-formed but cannot be honoured.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A single attribute resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    /// A required attribute has no value.
    #[error("required attribute '{0}' has no value")]
    RequiredMissing(String),

    /// A value does not fit the declared type.
    #[error("attribute '{id}' is not a valid {expected}")]
    AttributeTypeError {
        /// The attribute id.
        id: String,
        /// The declared type.
        expected: &'static str,
    },
}

impl AttributeError {
    /// Returns the id of the attribute concerned.
    #[must_use]
    pub fn attribute_id(&self) -> &str {
        match self {
            Self::RequiredMissing(id) | Self::AttributeTypeError { id, .. } => id,
        }
    }
}

/// Every failure of one resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeErrors(pub Vec<AttributeError>);

impl AttributeErrors {
    /// Returns the individual errors.
    #[must_use]
    pub fn errors(&self) -> &[AttributeError] {
        &self.0
    }

    /// Returns whether no error was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AttributeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AttributeErrors {}

/// RelayState errors.
#[derive(Debug, Error)]
pub enum RelayStateError {
    /// The token is unknown, already consumed or expired.
    #[error("relay state not found")]
    NotFound,

    /// The record answers the response's request but was sent to another IdP.
    #[error("relay state was issued for {expected}")]
    IssuerMismatch {
        /// The IdP the request was addressed to.
        expected: String,
    },

    /// The backing store failed.
    #[error("relay state store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_are_classified() {
        let err: FederationError = TrustError::UnknownEntity("https://x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Trust);
        assert!(err.is_client_error());

        let err: FederationError = ConfigurationError::NoRolesRegistered.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_client_error());
    }

    #[test]
    fn relay_state_not_found_is_generic() {
        let err: FederationError = RelayStateError::NotFound.into();
        assert_eq!(err.to_string(), "relay state not found");
    }

    #[test]
    fn attribute_errors_name_every_attribute() {
        let errors = AttributeErrors(vec![
            AttributeError::RequiredMissing("mail".to_string()),
            AttributeError::AttributeTypeError {
                id: "age".to_string(),
                expected: "xs:integer",
            },
        ]);
        let message = FederationError::from(errors).to_string();
        assert!(message.contains("'mail'"));
        assert!(message.contains("'age'"));
    }

    #[test]
    fn status_codes_for_idp_errors() {
        let err: FederationError =
            ProtocolError::InvalidNameIdPolicy("urn:x".to_string()).into();
        assert_eq!(err.status_code(), status_codes::REQUESTER);
        assert_eq!(err.sub_status_code(), Some(sub_status_codes::INVALID_NAMEID_POLICY));

        let err: FederationError = ConfigurationError::UndefinedServiceIndex(7).into();
        assert_eq!(err.status_code(), status_codes::RESPONDER);
        assert_eq!(err.sub_status_code(), Some(sub_status_codes::RESOURCE_NOT_RECOGNIZED));
    }

    #[test]
    fn unsuccessful_status_message() {
        let err = ProtocolError::UnsuccessfulStatus {
            code: "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed".to_string(),
            message: Some("bad password".to_string()),
        };
        assert!(err.to_string().ends_with("AuthnFailed: bad password"));
    }
}
