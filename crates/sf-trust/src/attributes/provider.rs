//! IdP-side attribute release.

use std::collections::HashSet;

use sf_saml::metadata::{select_default, AttributeConsumingServiceDescriptor, SpSsoDescriptor};
use sf_saml::types::{Attribute, AttributeStatement};

use super::{evaluate_typed, AttributeDescriptor, Evaluators, Principal};
use crate::error::{AttributeError, AttributeErrors, ConfigurationError, FederationResult};

/// What an IdP does when some requested attributes cannot be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleasePolicy {
    /// Fail the exchange with the collected [`AttributeErrors`].
    #[default]
    RejectIncomplete,
    /// Release whatever resolved and log the rest.
    ReleasePartial,
}

/// The attribute statement built for one SP, plus what could not be released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeRelease {
    /// The released attributes; `None` when nothing resolved.
    pub statement: Option<AttributeStatement>,
    /// Every failure; the statement holds everything else.
    pub errors: AttributeErrors,
}

impl AttributeRelease {
    /// Returns whether every requested, provided attribute was released.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Applies `policy`: the statement, or the errors when incomplete
    /// releases are rejected.
    pub fn apply(self, policy: ReleasePolicy) -> Result<Option<AttributeStatement>, AttributeErrors> {
        match policy {
            ReleasePolicy::RejectIncomplete if !self.is_complete() => Err(self.errors),
            _ => Ok(self.statement),
        }
    }
}

/// The attributes an IdP can provide, and how to evaluate them.
#[derive(Debug, Clone, Default)]
pub struct AttributeProvider {
    attributes: Vec<AttributeDescriptor>,
    evaluators: Evaluators,
}

impl AttributeProvider {
    /// Creates a provider.
    ///
    /// Fails when two attributes share a `(format, name)` pair or an
    /// attribute names an evaluator that is not registered.
    pub fn new(
        attributes: Vec<AttributeDescriptor>,
        evaluators: Evaluators,
    ) -> Result<Self, ConfigurationError> {
        let mut keys = HashSet::new();
        for attribute in &attributes {
            if !keys.insert(attribute.key()) {
                return Err(ConfigurationError::Invalid(format!(
                    "attribute '{}' is provided more than once",
                    attribute.name
                )));
            }
        }
        evaluators.check(&attributes)?;
        Ok(Self {
            attributes,
            evaluators,
        })
    }

    /// Returns the provided attributes.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Finds the provided attribute for `(format, name)`.
    #[must_use]
    pub fn find(&self, format: &str, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.key() == (format, name))
    }

    /// Returns the `saml:Attribute` entries published in IdP metadata.
    #[must_use]
    pub fn metadata_attributes(&self) -> Vec<Attribute> {
        self.attributes
            .iter()
            .map(|a| {
                let attribute = Attribute::new(a.name.clone()).with_friendly_name(a.id.clone());
                match &a.name_format {
                    Some(format) => attribute.with_format(format.clone()),
                    None => attribute,
                }
            })
            .collect()
    }

    /// Selects the requesting SP's attribute consuming service.
    ///
    /// Without an index the SP's default applies: the service marked
    /// `isDefault="true"`, else the first unmarked one, else the first.
    /// `Ok(None)` means the SP defines no service and named no index.
    pub fn select_service(
        sp: &SpSsoDescriptor,
        index: Option<u16>,
    ) -> Result<Option<&AttributeConsumingServiceDescriptor>, ConfigurationError> {
        match index {
            Some(index) => sp
                .attribute_consuming_service(index)
                .map(Some)
                .ok_or(ConfigurationError::UndefinedServiceIndex(index)),
            None => Ok(select_default(&sp.attribute_consuming_services)),
        }
    }

    /// Builds the attribute statement released to `requester` for `service`.
    ///
    /// Requested attributes this provider does not define are skipped.
    /// Missing required attributes and type errors are collected next to
    /// the partial statement; the caller decides what to do with them.
    pub fn build_statement(
        &self,
        principal: &dyn Principal,
        service: &AttributeConsumingServiceDescriptor,
        requester: &str,
    ) -> FederationResult<AttributeRelease> {
        let mut statement = AttributeStatement::new();
        let mut errors = AttributeErrors::default();
        for requested in &service.requested_attributes {
            let Some(provided) = self.find(requested.effective_name_format(), &requested.name)
            else {
                tracing::debug!(
                    attribute = %requested.name,
                    requester = %requester,
                    "requested attribute is not provided; skipped"
                );
                continue;
            };
            let values = match evaluate_typed(&self.evaluators, principal, provided, requester)? {
                Ok(Some(values)) => values,
                Ok(None) => {
                    if requested.is_required == Some(true) {
                        errors.0.push(AttributeError::RequiredMissing(provided.id.clone()));
                    }
                    continue;
                }
                Err(error) => {
                    errors.0.push(error);
                    continue;
                }
            };
            let friendly_name = requested
                .friendly_name
                .clone()
                .unwrap_or_else(|| provided.id.clone());
            let mut attribute = Attribute::new(requested.name.clone()).with_friendly_name(friendly_name);
            attribute.name_format = requested.name_format.clone();
            attribute.values = values.iter().map(super::TypedValue::to_saml).collect();
            statement = statement.with_attribute(attribute);
        }
        Ok(AttributeRelease {
            statement: (!statement.is_empty()).then_some(statement),
            errors,
        })
    }
}
