//! Attribute negotiation.
//!
//! SPs group the attributes they want into attribute consuming services,
//! identified by an index. An AuthnRequest names a service by index (or
//! relies on the default), and the attribute provider answers with the
//! requested attributes it knows how to produce.
//!
//! Values come from the authenticated [`Principal`]. By default an attribute
//! reads the principal property named by its id; an attribute can instead
//! name an [`AttributeEvaluator`] registered in [`Evaluators`].

mod provider;
mod value;

pub use provider::{AttributeProvider, AttributeRelease, ReleasePolicy};
pub use value::{PropertyValue, TypedValue, ValueType};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sf_saml::metadata::{
    AttributeConsumingServiceDescriptor, LocalizedName, RequestedAttributeDescriptor,
};
use sf_saml::types::{attrname_formats, Attribute};

use crate::error::{
    AttributeError, AttributeErrors, ConfigurationError, FederationError, FederationResult,
};

/// The authenticated user, as seen by attribute resolution.
pub trait Principal: Send + Sync {
    /// Stable identifier, used for persistent name IDs.
    fn identifier(&self) -> &str;

    /// Returns a named property.
    fn property(&self, name: &str) -> Option<PropertyValue>;

    /// When the user authenticated, if the host tracks it.
    fn authn_instant(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// A principal with a fixed set of properties.
#[derive(Debug, Clone, Default)]
pub struct SimplePrincipal {
    identifier: String,
    properties: HashMap<String, PropertyValue>,
    authn_instant: Option<DateTime<Utc>>,
}

impl SimplePrincipal {
    /// Creates a principal without properties.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Records the authentication instant.
    #[must_use]
    pub const fn authenticated_at(mut self, instant: DateTime<Utc>) -> Self {
        self.authn_instant = Some(instant);
        self
    }
}

impl Principal for SimplePrincipal {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        self.properties.get(name).cloned()
    }

    fn authn_instant(&self) -> Option<DateTime<Utc>> {
        self.authn_instant
    }
}

/// Describes one attribute: how it is named on the wire and where its value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Local id; the friendly name and the default principal property.
    pub id: String,
    /// SAML attribute name.
    pub name: String,
    /// SAML name format; `unspecified` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,
    /// Declared value type; values are passed through untouched when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    /// Name of the evaluator that produces the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
}

impl AttributeDescriptor {
    /// Creates a descriptor with id `id` and SAML name `name`.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            name_format: None,
            value_type: None,
            evaluator: None,
        }
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    /// Declares the value type.
    #[must_use]
    pub const fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Names the evaluator that produces the value.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl Into<String>) -> Self {
        self.evaluator = Some(evaluator.into());
        self
    }

    /// Returns the name format, defaulting to `unspecified`.
    #[must_use]
    pub fn effective_name_format(&self) -> &str {
        self.name_format.as_deref().unwrap_or(attrname_formats::UNSPECIFIED)
    }

    /// Returns the `(format, name)` pair attributes are matched by.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (self.effective_name_format(), &self.name)
    }
}

/// An attribute an SP asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAttribute {
    /// The attribute.
    #[serde(flatten)]
    pub descriptor: AttributeDescriptor,
    /// Whether the exchange is useless without it.
    #[serde(default)]
    pub required: bool,
}

impl RequestedAttribute {
    /// Creates an optional requested attribute.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            descriptor: AttributeDescriptor::new(id, name),
            required: false,
        }
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.with_format(format);
        self
    }

    /// Declares the value type.
    #[must_use]
    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.descriptor = self.descriptor.with_type(value_type);
        self
    }

    /// Names the evaluator that produces the value.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.with_evaluator(evaluator);
        self
    }

    /// Marks the attribute as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns the attribute id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    fn to_metadata(&self) -> RequestedAttributeDescriptor {
        RequestedAttributeDescriptor {
            name: self.descriptor.name.clone(),
            name_format: self.descriptor.name_format.clone(),
            friendly_name: Some(self.descriptor.id.clone()),
            is_required: self.required.then_some(true),
        }
    }
}

/// A set of attributes an SP asks for under one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConsumingService {
    /// Index, unique within the SP.
    pub index: u16,
    /// Whether the service applies when a request names no index.
    #[serde(default)]
    pub is_default: bool,
    /// Localized service names.
    pub service_names: Vec<LocalizedName>,
    /// Requested attributes in order.
    pub requested_attributes: Vec<RequestedAttribute>,
}

impl AttributeConsumingService {
    /// Creates a service with an English name.
    #[must_use]
    pub fn new(index: u16, name: impl Into<String>) -> Self {
        Self {
            index,
            is_default: false,
            service_names: vec![LocalizedName {
                lang: "en".to_string(),
                value: name.into(),
            }],
            requested_attributes: Vec::new(),
        }
    }

    /// Marks the service as default.
    #[must_use]
    pub const fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Adds a service name in another language.
    #[must_use]
    pub fn with_name(mut self, lang: impl Into<String>, name: impl Into<String>) -> Self {
        self.service_names.push(LocalizedName {
            lang: lang.into(),
            value: name.into(),
        });
        self
    }

    /// Appends a requested attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: RequestedAttribute) -> Self {
        self.requested_attributes.push(attribute);
        self
    }

    /// Finds the requested attribute matching a received `(format, name)`.
    #[must_use]
    pub fn requested(&self, format: &str, name: &str) -> Option<&RequestedAttribute> {
        self.requested_attributes
            .iter()
            .find(|r| r.descriptor.key() == (format, name))
    }

    /// Builds the metadata element for this service.
    #[must_use]
    pub fn to_metadata(&self) -> AttributeConsumingServiceDescriptor {
        AttributeConsumingServiceDescriptor {
            index: self.index,
            is_default: self.is_default.then_some(true),
            service_names: self.service_names.clone(),
            requested_attributes: self
                .requested_attributes
                .iter()
                .map(RequestedAttribute::to_metadata)
                .collect(),
        }
    }
}

/// The attribute consuming services of one SP.
///
/// Indices are unique and exactly one service is the default whenever any
/// service exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSet {
    services: Vec<AttributeConsumingService>,
}

impl ServiceSet {
    /// Validates and wraps `services`.
    pub fn new(services: Vec<AttributeConsumingService>) -> Result<Self, ConfigurationError> {
        let mut indices = HashSet::new();
        for service in &services {
            if !indices.insert(service.index) {
                return Err(ConfigurationError::DuplicateServiceIndex(service.index));
            }
        }
        match services.iter().filter(|s| s.is_default).count() {
            0 if !services.is_empty() => Err(ConfigurationError::NoDefaultDefined),
            0 | 1 => Ok(Self { services }),
            _ => Err(ConfigurationError::MultipleDefaultServices),
        }
    }

    /// Returns the services in definition order.
    #[must_use]
    pub fn services(&self) -> &[AttributeConsumingService] {
        &self.services
    }

    /// Returns whether no service is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Selects the service for a request.
    ///
    /// Without an index the default service applies; with no services at
    /// all that is [`ConfigurationError::NoDefaultDefined`]. An index no
    /// service carries is [`ConfigurationError::UndefinedServiceIndex`].
    pub fn resolve(&self, index: Option<u16>) -> Result<&AttributeConsumingService, ConfigurationError> {
        match index {
            Some(index) => self
                .services
                .iter()
                .find(|s| s.index == index)
                .ok_or(ConfigurationError::UndefinedServiceIndex(index)),
            None => self
                .services
                .iter()
                .find(|s| s.is_default)
                .ok_or(ConfigurationError::NoDefaultDefined),
        }
    }
}

/// Produces attribute values in place of a principal property.
pub trait AttributeEvaluator: Send + Sync {
    /// Returns the value for `attribute`, or `None` when there is none.
    ///
    /// `requester` is the entity ID of the party the value is released to.
    fn evaluate(
        &self,
        principal: &dyn Principal,
        attribute: &AttributeDescriptor,
        requester: &str,
    ) -> Option<PropertyValue>;
}

impl<F> AttributeEvaluator for F
where
    F: Fn(&dyn Principal, &AttributeDescriptor, &str) -> Option<PropertyValue> + Send + Sync,
{
    fn evaluate(
        &self,
        principal: &dyn Principal,
        attribute: &AttributeDescriptor,
        requester: &str,
    ) -> Option<PropertyValue> {
        self(principal, attribute, requester)
    }
}

/// Named attribute evaluators.
#[derive(Clone, Default)]
pub struct Evaluators {
    named: HashMap<String, Arc<dyn AttributeEvaluator>>,
}

impl fmt::Debug for Evaluators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.named.keys()).finish()
    }
}

impl Evaluators {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `evaluator` under `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, evaluator: impl AttributeEvaluator + 'static) -> Self {
        self.named.insert(name.into(), Arc::new(evaluator));
        self
    }

    /// Returns whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Evaluates `attribute` for `principal`.
    ///
    /// Reads the property named by the attribute id unless the attribute
    /// names an evaluator.
    pub fn evaluate(
        &self,
        principal: &dyn Principal,
        attribute: &AttributeDescriptor,
        requester: &str,
    ) -> Result<Option<PropertyValue>, ConfigurationError> {
        match &attribute.evaluator {
            None => Ok(principal.property(&attribute.id)),
            Some(name) => {
                let evaluator = self.named.get(name).ok_or_else(|| {
                    ConfigurationError::Invalid(format!(
                        "attribute '{}' names unknown evaluator '{name}'",
                        attribute.id
                    ))
                })?;
                Ok(evaluator.evaluate(principal, attribute, requester))
            }
        }
    }

    /// Checks that every named evaluator in `attributes` is registered.
    pub fn check<'a>(
        &self,
        attributes: impl IntoIterator<Item = &'a AttributeDescriptor>,
    ) -> Result<(), ConfigurationError> {
        for attribute in attributes {
            if let Some(name) = &attribute.evaluator {
                if !self.contains(name) {
                    return Err(ConfigurationError::Invalid(format!(
                        "attribute '{}' names unknown evaluator '{name}'",
                        attribute.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Values resolved for one service, plus whatever went wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeResolution {
    /// Values by attribute id, in request order.
    pub values: BTreeMap<String, Vec<TypedValue>>,
    /// Every failure; resolution continues past them.
    pub errors: AttributeErrors,
}

impl AttributeResolution {
    /// Returns the values, or every collected error.
    pub fn into_result(self) -> Result<BTreeMap<String, Vec<TypedValue>>, AttributeErrors> {
        if self.errors.is_empty() {
            Ok(self.values)
        } else {
            Err(self.errors)
        }
    }
}

/// Evaluates one attribute and applies its declared type.
///
/// `Ok(None)` means there is no value.
pub(crate) fn evaluate_typed(
    evaluators: &Evaluators,
    principal: &dyn Principal,
    attribute: &AttributeDescriptor,
    requester: &str,
) -> FederationResult<Result<Option<Vec<TypedValue>>, AttributeError>> {
    let values = match evaluators.evaluate(principal, attribute, requester)? {
        Some(value) => value.into_values(),
        None => return Ok(Ok(None)),
    };
    if values.is_empty() {
        return Ok(Ok(None));
    }
    let Some(value_type) = attribute.value_type else {
        return Ok(Ok(Some(values)));
    };
    let typed: Option<Vec<_>> = values.into_iter().map(|v| v.coerce(value_type)).collect();
    Ok(typed.map(Some).ok_or_else(|| AttributeError::AttributeTypeError {
        id: attribute.id.clone(),
        expected: value_type.xs_name(),
    }))
}

/// Resolves the values of every attribute `service` requests.
///
/// Failures are collected instead of stopping at the first one: a missing
/// required attribute or a value of the wrong type is recorded and the
/// remaining attributes are still resolved.
pub fn resolve_attribute_values(
    evaluators: &Evaluators,
    principal: &dyn Principal,
    service: &AttributeConsumingService,
    requester: &str,
) -> FederationResult<AttributeResolution> {
    let mut resolution = AttributeResolution::default();
    for requested in &service.requested_attributes {
        match evaluate_typed(evaluators, principal, &requested.descriptor, requester)? {
            Ok(Some(values)) => {
                resolution.values.insert(requested.id().to_string(), values);
            }
            Ok(None) if requested.required => {
                resolution
                    .errors
                    .0
                    .push(AttributeError::RequiredMissing(requested.id().to_string()));
            }
            Ok(None) => {}
            Err(error) => resolution.errors.0.push(error),
        }
    }
    Ok(resolution)
}

/// Maps received attributes to local keys.
///
/// Attributes matching a requested attribute of `service` by
/// `(format, name)` are keyed by that attribute's id; others keep their
/// SAML name. Values are decoded according to their `xsi:type`.
#[must_use]
pub fn map_received_attributes<'a>(
    service: Option<&AttributeConsumingService>,
    attributes: impl IntoIterator<Item = &'a Attribute>,
) -> BTreeMap<String, Vec<TypedValue>> {
    let mut mapped: BTreeMap<String, Vec<TypedValue>> = BTreeMap::new();
    for attribute in attributes {
        let key = service
            .and_then(|s| s.requested(attribute.effective_name_format(), &attribute.name))
            .map_or_else(|| attribute.name.clone(), |r| r.id().to_string());
        mapped
            .entry(key)
            .or_default()
            .extend(attribute.values.iter().map(TypedValue::from_saml));
    }
    mapped
}
