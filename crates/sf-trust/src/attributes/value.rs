//! Typed attribute values.
//!
//! Attribute values travel as `saml:AttributeValue` text with an
//! `xsi:type` of `xs:string`, `xs:boolean`, `xs:integer` or `xs:dateTime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sf_saml::types::AttributeValue;
use sf_saml::xml::{format_instant, parse_bool, parse_instant};

/// XML Schema type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// `xs:string`
    String,
    /// `xs:boolean`
    Boolean,
    /// `xs:integer`
    Integer,
    /// `xs:dateTime`
    DateTime,
}

impl ValueType {
    /// Returns the prefixed schema type name.
    #[must_use]
    pub const fn xs_name(self) -> &'static str {
        match self {
            Self::String => "xs:string",
            Self::Boolean => "xs:boolean",
            Self::Integer => "xs:integer",
            Self::DateTime => "xs:dateTime",
        }
    }

    /// Looks a type up by its local name.
    #[must_use]
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "integer" | "int" | "long" => Some(Self::Integer),
            "dateTime" => Some(Self::DateTime),
            _ => None,
        }
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// A string.
    String(String),
    /// A boolean.
    Boolean(bool),
    /// An integer.
    Integer(i64),
    /// An instant.
    DateTime(DateTime<Utc>),
}

impl TypedValue {
    /// Returns the value's type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::DateTime(_) => ValueType::DateTime,
        }
    }

    /// Returns the lexical form.
    #[must_use]
    pub fn lexical(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::DateTime(dt) => format_instant(*dt),
        }
    }

    /// Converts the value to `target`.
    ///
    /// Anything converts to a string; strings convert to other types when
    /// their lexical form parses. Returns `None` otherwise.
    #[must_use]
    pub fn coerce(self, target: ValueType) -> Option<Self> {
        if self.value_type() == target {
            return Some(self);
        }
        match (self, target) {
            (value, ValueType::String) => Some(Self::String(value.lexical())),
            (Self::String(s), other) => Self::parse(&s, other),
            _ => None,
        }
    }

    /// Parses a lexical form as `value_type`.
    #[must_use]
    pub fn parse(lexical: &str, value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::String => Some(Self::String(lexical.to_string())),
            ValueType::Boolean => parse_bool(lexical).ok().map(Self::Boolean),
            ValueType::Integer => lexical.trim().parse().ok().map(Self::Integer),
            ValueType::DateTime => parse_instant(lexical).ok().map(Self::DateTime),
        }
    }

    /// Builds the `saml:AttributeValue` for this value.
    #[must_use]
    pub fn to_saml(&self) -> AttributeValue {
        AttributeValue::typed(self.lexical(), self.value_type().xs_name())
    }

    /// Reads a received `saml:AttributeValue`.
    ///
    /// Untyped values and values of unknown type are strings. A typed value
    /// whose text does not parse is kept as a string.
    #[must_use]
    pub fn from_saml(value: &AttributeValue) -> Self {
        value
            .type_local_name()
            .and_then(ValueType::from_local_name)
            .and_then(|value_type| Self::parse(&value.text, value_type))
            .unwrap_or_else(|| Self::String(value.text.clone()))
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for TypedValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

/// A principal property or evaluator result: one value or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A single value.
    Single(TypedValue),
    /// An ordered sequence of values.
    Sequence(Vec<TypedValue>),
}

impl PropertyValue {
    /// Returns the values in order.
    #[must_use]
    pub fn into_values(self) -> Vec<TypedValue> {
        match self {
            Self::Single(value) => vec![value],
            Self::Sequence(values) => values,
        }
    }
}

macro_rules! single_property {
    ($($ty:ty),*) => {
        $(impl From<$ty> for PropertyValue {
            fn from(value: $ty) -> Self {
                Self::Single(value.into())
            }
        })*
    };
}

single_property!(&str, String, bool, i64, DateTime<Utc>, TypedValue);

impl<T: Into<TypedValue>> FromIterator<T> for PropertyValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::Sequence(iter.into_iter().map(Into::into).collect())
    }
}
