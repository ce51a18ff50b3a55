//! Pending local edits of one work package.
//!
//! A [`Changeset`] overlays a map of modified attributes on the pristine
//! snapshot it was built from. Writing the pristine value back removes the
//! modification, so an edit that ends where it started leaves the change-set
//! empty. The projected resource (pristine + modifications) is computed on
//! read and never stored.
//!
//! The editing service hands out change-sets as [`ChangesetRef`] handles so
//! that every caller editing the same work package shares one instance.
//! Modifications made through the handle are reported to the listener the
//! service attached, after the change-set lock is released.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ValidationErrors;
use crate::lock;
use crate::model::{AttrValue, Form, LockVersion, Schema, Snapshot, WorkPackageId};

// ---------------------------------------------------------------------------
// Changeset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Changeset {
    pristine: Arc<Snapshot>,
    changes: BTreeMap<String, AttrValue>,
    in_flight: bool,
    form: Option<Form>,
}

impl Changeset {
    #[must_use]
    pub fn new(pristine: Arc<Snapshot>, form: Option<Form>) -> Self {
        Self {
            pristine,
            changes: BTreeMap::new(),
            in_flight: false,
            form,
        }
    }

    #[must_use]
    pub fn work_package_id(&self) -> &WorkPackageId {
        &self.pristine.id
    }

    #[must_use]
    pub fn pristine(&self) -> &Arc<Snapshot> {
        &self.pristine
    }

    /// Modified value if present, else the pristine value.
    #[must_use]
    pub fn value(&self, attribute: &str) -> &AttrValue {
        self.changes
            .get(attribute)
            .unwrap_or_else(|| self.pristine.value(attribute))
    }

    /// Record a modification. Writing the pristine value removes the entry.
    pub fn set_value(&mut self, attribute: impl Into<String>, value: AttrValue) {
        let attribute = attribute.into();
        if self.pristine.value(&attribute) == &value {
            self.changes.remove(&attribute);
        } else {
            self.changes.insert(attribute, value);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn changed_attributes(&self) -> Vec<&str> {
        self.changes.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub const fn changes(&self) -> &BTreeMap<String, AttrValue> {
        &self.changes
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) const fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    #[must_use]
    pub const fn form(&self) -> Option<&Form> {
        self.form.as_ref()
    }

    pub fn set_form(&mut self, form: Form) {
        self.form = Some(form);
    }

    /// Drop all local edits and the attached form.
    ///
    /// The in-flight flag is left alone; only the save that set it may
    /// lower it again.
    pub fn clear(&mut self) {
        self.changes.clear();
        self.form = None;
    }

    /// Read/write view whose writes route back through this change-set.
    pub const fn projected_resource(&mut self) -> ProjectedResource<'_> {
        ProjectedResource { changeset: self }
    }

    /// Pristine snapshot with the modifications applied.
    #[must_use]
    pub fn projected_snapshot(&self) -> Snapshot {
        let mut projected = Snapshot::clone(&self.pristine);
        for (attribute, value) in &self.changes {
            match value {
                AttrValue::Null => {
                    projected.attributes.remove(attribute);
                }
                _ => {
                    projected.attributes.insert(attribute.clone(), value.clone());
                }
            }
        }
        projected
    }

    /// Whether `attribute` is currently editable per the schema and entity.
    #[must_use]
    pub fn is_writable(&self, attribute: &str, schema: &Schema) -> bool {
        !self.pristine.readonly && schema.is_writable(attribute)
    }

    /// Effective disabled state of a control bound to `attribute`.
    #[must_use]
    pub fn is_disabled(&self, attribute: &str, schema: &Schema) -> bool {
        !self.is_writable(attribute, schema) || self.in_flight
    }

    /// Build the payload to submit, validating against `schema` first.
    ///
    /// Validation covers unknown or non-writable modified attributes, value
    /// shape mismatches, blank required fields on the projected resource and
    /// any errors carried by the attached form.
    pub fn build_request_payload(&self, schema: &Schema) -> Result<RequestPayload, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(form) = &self.form {
            errors.merge(&form.validation_errors);
        }

        for (attribute, value) in &self.changes {
            match schema.get(attribute) {
                None => errors.add(attribute.clone(), "is not a known attribute"),
                Some(field) if !field.writable => errors.add(attribute.clone(), "is not writable"),
                Some(field) if !field.kind.accepts(value) => {
                    errors.add(attribute.clone(), "has an invalid format");
                }
                Some(_) => {}
            }
        }

        for attribute in schema.required_fields() {
            let projected = self.changes.get(attribute).or_else(|| {
                self.form
                    .as_ref()
                    .and_then(|form| form.payload.get(attribute))
            });
            let value = projected.unwrap_or_else(|| self.pristine.value(attribute));
            if value.is_blank() {
                errors.add(attribute, "can't be blank");
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut payload = RequestPayload::new(self.pristine.lock_version);
        if let Some(form) = &self.form {
            for (attribute, value) in &form.payload {
                payload.insert(schema, attribute, value.clone());
            }
        }
        for (attribute, value) in &self.changes {
            payload.insert(schema, attribute, value.clone());
        }
        Ok(payload)
    }
}

// ---------------------------------------------------------------------------
// ProjectedResource
// ---------------------------------------------------------------------------

/// Merged view of a change-set; reads fall back to pristine values and
/// writes are recorded as modifications.
pub struct ProjectedResource<'a> {
    changeset: &'a mut Changeset,
}

impl ProjectedResource<'_> {
    #[must_use]
    pub fn get(&self, attribute: &str) -> &AttrValue {
        self.changeset.value(attribute)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: AttrValue) {
        self.changeset.set_value(attribute, value);
    }

    #[must_use]
    pub fn id(&self) -> &WorkPackageId {
        self.changeset.work_package_id()
    }

    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        self.changeset.projected_snapshot()
    }
}

// ---------------------------------------------------------------------------
// RequestPayload
// ---------------------------------------------------------------------------

/// Body submitted to `updateImmediately`: scalar attributes at the top
/// level, link-valued attributes under `_links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub lock_version: LockVersion,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, AttrValue>,
}

impl RequestPayload {
    #[must_use]
    pub const fn new(lock_version: LockVersion) -> Self {
        Self {
            lock_version,
            attributes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    fn insert(&mut self, schema: &Schema, attribute: &str, value: AttrValue) {
        let is_link = schema
            .get(attribute)
            .map_or_else(|| value.is_link_like(), |field| field.kind.is_link());
        if is_link {
            self.attributes.remove(attribute);
            self.links.insert(attribute.to_string(), value);
        } else {
            self.links.remove(attribute);
            self.attributes.insert(attribute.to_string(), value);
        }
    }

    /// Value submitted for `attribute`, wherever it was placed.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&AttrValue> {
        self.attributes
            .get(attribute)
            .or_else(|| self.links.get(attribute))
    }

    /// All submitted attributes, scalars and links together.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.attributes.iter().chain(self.links.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len() + self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// ChangesetRef
// ---------------------------------------------------------------------------

/// Called with the work package id whenever the modifications change.
pub type ChangeListener = Arc<dyn Fn(&WorkPackageId) + Send + Sync>;

/// Shared handle to a change-set registered with the editing service.
///
/// Writes through [`lock`](Self::lock) are not reported to the listener;
/// use [`set_value`](Self::set_value) or [`modify`](Self::modify) for edits.
#[derive(Clone)]
pub struct ChangesetRef {
    inner: Arc<Mutex<Changeset>>,
    listener: Arc<Mutex<Option<ChangeListener>>>,
}

impl fmt::Debug for ChangesetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("ChangesetRef");
        match self.inner.try_lock() {
            Ok(current) => out.field("changeset", &*current),
            Err(_) => out.field("changeset", &"<locked>"),
        };
        out.finish_non_exhaustive()
    }
}

impl ChangesetRef {
    #[must_use]
    pub fn new(changeset: Changeset) -> Self {
        Self {
            inner: Arc::new(Mutex::new(changeset)),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Changeset> {
        lock(&self.inner)
    }

    /// Whether both handles point at the same change-set instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_listener(&self, listener: ChangeListener) {
        *lock(&self.listener) = Some(listener);
    }

    #[must_use]
    pub fn work_package_id(&self) -> WorkPackageId {
        self.lock().work_package_id().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.lock().in_flight()
    }

    #[must_use]
    pub fn value(&self, attribute: &str) -> AttrValue {
        self.lock().value(attribute).clone()
    }

    /// Record a modification and notify the listener if it changed anything.
    pub fn set_value(&self, attribute: impl Into<String>, value: AttrValue) {
        let attribute = attribute.into();
        let changed = {
            let mut current = self.lock();
            let before = current.changes.get(&attribute).cloned();
            current.set_value(attribute.as_str(), value);
            current.changes.get(&attribute) != before.as_ref()
        };
        if changed {
            self.notify_changed();
        }
    }

    /// Apply several edits under one lock; the listener hears about the
    /// batch once, and only if the modifications differ afterwards.
    pub fn modify<R>(&self, edit: impl FnOnce(&mut Changeset) -> R) -> R {
        let (result, changed) = {
            let mut current = self.lock();
            let before = current.changes.clone();
            let result = edit(&mut current);
            let changed = current.changes != before;
            (result, changed)
        };
        if changed {
            self.notify_changed();
        }
        result
    }

    #[must_use]
    pub fn projected_snapshot(&self) -> Snapshot {
        self.lock().projected_snapshot()
    }

    fn notify_changed(&self) {
        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            let id = self.work_package_id();
            listener(&id);
        }
    }
}
