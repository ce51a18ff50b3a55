//! Defaults derived from the active query filters.
//!
//! A work package created inside a filtered list should match the filters
//! that list is showing, so `=` filters seed the new change-set. Existing
//! values that already satisfy a filter are left alone.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changeset::Changeset;
use crate::model::{AttrValue, FieldKind, Link, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "!")]
    NotEquals,
    #[serde(rename = "~")]
    Contains,
    #[serde(rename = "*")]
    Any,
    #[serde(rename = "!*")]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub attribute: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub values: Vec<AttrValue>,
}

impl QueryFilter {
    #[must_use]
    pub fn equals(attribute: impl Into<String>, values: Vec<AttrValue>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: FilterOperator::Equals,
            values,
        }
    }
}

/// Seed `changeset` from the `=` filters. Returns the number of attributes
/// that were modified.
pub fn apply_defaults_from_filters(
    changeset: &mut Changeset,
    schema: &Schema,
    filters: &[QueryFilter],
) -> usize {
    let mut applied = 0;
    for filter in filters {
        if filter.operator != FilterOperator::Equals || filter.values.is_empty() {
            continue;
        }
        if !changeset.is_writable(&filter.attribute, schema) {
            continue;
        }
        if already_matches(changeset.value(&filter.attribute), &filter.values) {
            debug!(attribute = %filter.attribute, "current value already matches filter");
            continue;
        }

        let multi = schema
            .get(&filter.attribute)
            .is_some_and(|field| field.kind == FieldKind::Links);
        let value = if multi {
            AttrValue::Links(filter.values.iter().filter_map(AttrValue::as_link).cloned().collect())
        } else {
            filter.values[0].clone()
        };
        changeset.set_value(filter.attribute.clone(), value);
        applied += 1;
    }
    applied
}

fn already_matches(current: &AttrValue, values: &[AttrValue]) -> bool {
    match current {
        AttrValue::Null => false,
        AttrValue::Links(links) => links.iter().any(|link| contains_link(values, link)),
        other => values.contains(other),
    }
}

fn contains_link(values: &[AttrValue], link: &Link) -> bool {
    values.iter().any(|value| value.as_link() == Some(link))
}
