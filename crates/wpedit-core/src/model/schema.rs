use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::work_package::AttrValue;

/// Value shape a schema field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Int,
    Bool,
    Date,
    Link,
    Links,
}

impl FieldKind {
    /// Whether `value` has the shape this field expects. `Null` always fits.
    #[must_use]
    pub const fn accepts(self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (_, AttrValue::Null)
                | (Self::Text, AttrValue::Text(_))
                | (Self::Int, AttrValue::Int(_))
                | (Self::Bool, AttrValue::Bool(_))
                | (Self::Date, AttrValue::Date(_))
                | (Self::Link, AttrValue::Link(_))
                | (Self::Links, AttrValue::Links(_))
        )
    }

    /// Link-valued fields travel under `_links` in request payloads.
    #[must_use]
    pub const fn is_link(self) -> bool {
        matches!(self, Self::Link | Self::Links)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldSchema {
    #[must_use]
    pub const fn writable(kind: FieldKind) -> Self {
        Self {
            writable: true,
            required: false,
            kind,
        }
    }

    #[must_use]
    pub const fn required(kind: FieldKind) -> Self {
        Self {
            writable: true,
            required: true,
            kind,
        }
    }

    #[must_use]
    pub const fn read_only(kind: FieldKind) -> Self {
        Self {
            writable: false,
            required: false,
            kind,
        }
    }
}

/// Capability lookup for one work package type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub type_href: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,
}

impl Schema {
    pub fn new(type_href: impl Into<String>) -> Self {
        Self {
            type_href: type_href.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, attribute: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(attribute.into(), schema);
        self
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&FieldSchema> {
        self.fields.get(attribute)
    }

    #[must_use]
    pub fn is_writable(&self, attribute: &str) -> bool {
        self.get(attribute).is_some_and(|field| field.writable)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, field)| field.required)
            .map(|(name, _)| name.as_str())
    }
}

/// Server-side form state attached to a change-set: default payload values
/// and validation errors reported by the last form round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    #[serde(default)]
    pub payload: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub validation_errors: BTreeMap<String, Vec<String>>,
}
