//! Editability of single attributes: inline edit fields and the status button.

use serde::Serialize;
use tracing::trace;

use crate::changeset::ChangesetRef;
use crate::editing::{EditResourceView, EditingService};
use crate::model::{STATUS, Snapshot, WorkPackageId};

// ---------------------------------------------------------------------------
// EditField
// ---------------------------------------------------------------------------

/// One inline-editable attribute of a displayed work package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditField {
    field_name: String,
    work_package_id: WorkPackageId,
    active: bool,
}

impl EditField {
    #[must_use]
    pub fn new(work_package_id: WorkPackageId, field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            work_package_id,
            active: false,
        }
    }

    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    #[must_use]
    pub const fn work_package_id(&self) -> &WorkPackageId {
        &self.work_package_id
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// The resource to render: projected while edits exist, else cached.
    #[must_use]
    pub fn resource(&self, service: &EditingService) -> EditResourceView {
        service.temporary_edit_resource(&self.work_package_id)
    }

    /// Whether the field may be edited right now. Unknown schemas and
    /// uncached work packages are not editable.
    #[must_use]
    pub fn is_editable(&self, service: &EditingService) -> bool {
        let Some(resource) = self.resource(service).value() else {
            return false;
        };
        attribute_editable(service, &resource, &self.field_name)
    }

    /// Switch the field into edit mode if it is editable.
    pub fn activate_if_editable(&mut self, service: &EditingService) -> bool {
        if self.is_editable(service) {
            self.active = true;
            trace!(id = %self.work_package_id, field = %self.field_name, "field activated");
        }
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

fn attribute_editable(service: &EditingService, resource: &Snapshot, attribute: &str) -> bool {
    !resource.readonly
        && service
            .schema_for(resource)
            .is_some_and(|schema| schema.is_writable(attribute))
}

// ---------------------------------------------------------------------------
// StatusButton
// ---------------------------------------------------------------------------

/// Tooltip shown on the status button, as a message key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonTitle {
    None,
    /// The whole work package is read-only.
    ReadOnly,
    /// The work package is editable but the status cannot change now.
    StatusBlocked,
}

impl ButtonTitle {
    #[must_use]
    pub const fn message_key(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::ReadOnly => Some("work_packages.message_work_package_read_only"),
            Self::StatusBlocked => Some("work_packages.message_work_package_status_blocked"),
        }
    }
}

/// The status dropdown button of a work package.
pub struct StatusButton<'a> {
    service: &'a EditingService,
    work_package: Snapshot,
}

impl<'a> StatusButton<'a> {
    #[must_use]
    pub fn new(service: &'a EditingService, work_package: Snapshot) -> Self {
        Self {
            service,
            work_package,
        }
    }

    /// Re-read the work package from the temporary edit resource.
    pub fn refresh(&mut self) {
        if let Some(current) = self
            .service
            .temporary_edit_resource(&self.work_package.id)
            .value()
        {
            self.work_package = (*current).clone();
        }
    }

    fn changeset(&self) -> Option<ChangesetRef> {
        self.service.existing_change(&self.work_package.id)
    }

    /// The user may change the status of this work package at all.
    #[must_use]
    pub fn allowed(&self) -> bool {
        attribute_editable(self.service, &self.work_package, STATUS)
    }

    /// Disabled when not allowed, not writable in the change-set, or while a
    /// save is in flight.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        let Some(schema) = self.service.schema_for(&self.work_package) else {
            return true;
        };
        let (writable, in_flight) = self.changeset().map_or_else(
            || (!self.work_package.readonly && schema.is_writable(STATUS), false),
            |changeset| {
                let current = changeset.lock();
                (current.is_writable(STATUS, &schema), current.in_flight())
            },
        );
        !self.allowed() || !writable || in_flight
    }

    #[must_use]
    pub fn button_title(&self) -> ButtonTitle {
        if self.work_package.readonly {
            ButtonTitle::ReadOnly
        } else if self.is_disabled() {
            ButtonTitle::StatusBlocked
        } else {
            ButtonTitle::None
        }
    }
}
