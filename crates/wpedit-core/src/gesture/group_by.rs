//! Dragging a row between the groups of a grouped table.
//!
//! Dropping a work package into a group writes that group's value into the
//! grouped attribute and saves immediately. Errors go to the notifier once;
//! nothing is retried.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::editing::{CommitRecord, EditingService};
use crate::model::{AttrValue, Link, Snapshot};
use crate::notify::Notifier;

/// One group header of a grouped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub identifier: String,
    #[serde(default)]
    pub value: AttrValue,
    /// Resources the group value refers to, when it is link-valued.
    #[serde(default)]
    pub value_links: Vec<Link>,
}

impl Group {
    #[must_use]
    pub fn scalar(identifier: impl Into<String>, value: AttrValue) -> Self {
        Self {
            identifier: identifier.into(),
            value,
            value_links: Vec::new(),
        }
    }

    #[must_use]
    pub fn linked(identifier: impl Into<String>, links: Vec<Link>) -> Self {
        Self {
            identifier: identifier.into(),
            value: AttrValue::Null,
            value_links: links,
        }
    }

    /// The value a work package dropped into this group receives.
    #[must_use]
    pub fn drop_value(&self) -> AttrValue {
        match self.value_links.as_slice() {
            [] => self.value.clone(),
            [single] => AttrValue::Link(single.clone()),
            many => AttrValue::Links(many.to_vec()),
        }
    }
}

/// Drag action of a table grouped by `attribute`.
#[derive(Debug, Clone, Default)]
pub struct GroupByDrag {
    attribute: Option<String>,
    groups: Vec<Group>,
}

impl GroupByDrag {
    #[must_use]
    pub fn new(attribute: Option<String>, groups: Vec<Group>) -> Self {
        Self { attribute, groups }
    }

    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// The action only applies while the table is grouped.
    #[must_use]
    pub const fn applies(&self) -> bool {
        self.attribute.is_some()
    }

    /// Whether `work_package` may be dragged out of its group.
    #[must_use]
    pub fn can_pickup(&self, service: &EditingService, work_package: &Snapshot) -> bool {
        let Some(attribute) = self.attribute.as_deref() else {
            return false;
        };
        !work_package.readonly
            && service
                .schema_for(work_package)
                .is_some_and(|schema| schema.is_writable(attribute))
    }

    /// Value for the group with `identifier`; unknown groups yield `Null`.
    #[must_use]
    pub fn value_for_group(&self, identifier: &str) -> AttrValue {
        self.groups
            .iter()
            .find(|group| group.identifier == identifier)
            .map_or(AttrValue::Null, Group::drop_value)
    }

    /// Move `work_package` into the group `group_identifier` and save.
    ///
    /// Returns the commit on success. On failure the notifier has already
    /// been told and `None` is returned.
    pub async fn handle_drop(
        &self,
        service: &EditingService,
        notifier: &dyn Notifier,
        work_package: &Arc<Snapshot>,
        group_identifier: &str,
    ) -> Option<CommitRecord> {
        let Some(attribute) = self.attribute.as_deref() else {
            debug!(id = %work_package.id, "drop ignored, table is not grouped");
            return None;
        };

        let value = self.value_for_group(group_identifier);
        debug!(id = %work_package.id, attribute, group = group_identifier, %value, "group drop");

        let changeset = service.change_for(work_package, None);
        changeset.set_value(attribute, value);
        match service.save(&changeset).await {
            Ok(commit) => Some(commit),
            Err(err) => {
                notifier.handle_raw_error(&err, &work_package.id);
                None
            }
        }
    }
}
