use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Id sentinel for work packages that have not been persisted yet.
pub const NEW_ID: &str = "new";

pub const SUBJECT: &str = "subject";
pub const STATUS: &str = "status";
pub const PARENT: &str = "parent";
pub const START_DATE: &str = "startDate";
pub const DUE_DATE: &str = "dueDate";

/// Optimistic-concurrency counter carried by every persisted work package.
pub type LockVersion = u64;

static NULL_VALUE: AttrValue = AttrValue::Null;

// ---------------------------------------------------------------------------
// WorkPackageId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkPackageId(String);

impl WorkPackageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The sentinel id used by unsaved work packages.
    #[must_use]
    pub fn unsaved() -> Self {
        Self(NEW_ID.to_string())
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.0 == NEW_ID
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical API path of this work package.
    #[must_use]
    pub fn href(&self) -> String {
        format!("/api/v3/work_packages/{}", self.0)
    }

    /// Parse the id out of a work package href (the last path segment).
    #[must_use]
    pub fn from_href(href: &str) -> Option<Self> {
        let segment = href.trim_end_matches('/').rsplit('/').next()?;
        if segment.is_empty() {
            None
        } else {
            Some(Self::new(segment))
        }
    }
}

impl fmt::Display for WorkPackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkPackageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WorkPackageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Link / AttrValue
// ---------------------------------------------------------------------------

/// A hypermedia reference to another resource (type, status, user, ...).
///
/// Two links are equal when they point at the same `href`; the title is
/// display-only.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: None,
        }
    }

    #[must_use]
    pub fn titled(href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: Some(title.into()),
        }
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.href == other.href
    }
}

/// The value of a single work package attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Date(NaiveDate),
    Link(Link),
    Links(Vec<Link>),
}

impl AttrValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn link(href: impl Into<String>) -> Self {
        Self::Link(Link::new(href))
    }

    /// True for values a required field may not hold.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Links(links) => links.is_empty(),
            Self::Bool(_) | Self::Int(_) | Self::Date(_) | Self::Link(_) => false,
        }
    }

    #[must_use]
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_link(&self) -> Option<&Link> {
        match self {
            Self::Link(link) => Some(link),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_link_like(&self) -> bool {
        matches!(self, Self::Link(_) | Self::Links(_))
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("-"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Self::Link(link) => f.write_str(link.title.as_deref().unwrap_or(&link.href)),
            Self::Links(links) => {
                let rendered: Vec<&str> = links
                    .iter()
                    .map(|link| link.title.as_deref().unwrap_or(&link.href))
                    .collect();
                f.write_str(&rendered.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Last-known server representation of a work package.
///
/// Cached snapshots are shared behind `Arc` and never mutated in place; a
/// fetch or save replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: WorkPackageId,
    #[serde(default)]
    pub lock_version: LockVersion,
    /// Href of the work package type; also the key of its schema.
    pub type_href: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default = "default_true")]
    pub is_leaf: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// A fresh, unsaved work package of the given type.
    #[must_use]
    pub fn unsaved(type_href: impl Into<String>) -> Self {
        Self::new(WorkPackageId::unsaved(), type_href)
    }

    #[must_use]
    pub fn new(id: impl Into<WorkPackageId>, type_href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lock_version: 0,
            type_href: type_href.into(),
            attributes: BTreeMap::new(),
            is_leaf: true,
            readonly: false,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(attribute.into(), value);
        self
    }

    #[must_use]
    pub const fn with_lock_version(mut self, lock_version: LockVersion) -> Self {
        self.lock_version = lock_version;
        self
    }

    #[must_use]
    pub fn with_parent(self, parent: &WorkPackageId) -> Self {
        self.with(PARENT, AttrValue::link(parent.href()))
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.is_new()
    }

    /// Value of `attribute`, `Null` when absent.
    #[must_use]
    pub fn value(&self, attribute: &str) -> &AttrValue {
        self.attributes.get(attribute).unwrap_or(&NULL_VALUE)
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.value(SUBJECT).as_text()
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<WorkPackageId> {
        self.value(PARENT)
            .as_link()
            .and_then(|link| WorkPackageId::from_href(&link.href))
    }

    /// Copy over attributes the server response omitted from `previous`.
    pub fn retain_from(&mut self, previous: &Self) {
        for (attribute, value) in &previous.attributes {
            self.attributes
                .entry(attribute.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

const fn default_true() -> bool {
    true
}
