//! Replay script format.
//!
//! A script seeds an in-memory API with fixtures and lists the editing
//! steps to run against it, in order:
//!
//! ```json
//! {
//!   "fixtures": { "schemas": [...], "work_packages": [...] },
//!   "steps": [
//!     { "op": "set", "id": "1", "attribute": "subject", "value": { "kind": "text", "value": "New" } },
//!     { "op": "save", "id": "1" }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use wpedit_core::attachments::Attachment;
use wpedit_core::filter_values::QueryFilter;
use wpedit_core::gesture::{DragDirection, Group};
use wpedit_core::{AttrValue, Schema, Snapshot, WorkPackageId};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub fixtures: Fixtures,
    #[serde(default)]
    pub view: ScriptView,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub schemas: Vec<Schema>,
    #[serde(default)]
    pub work_packages: Vec<Snapshot>,
    #[serde(default)]
    pub attachments: Vec<AttachmentFixture>,
}

/// An attachment listed on a work package.
#[derive(Debug, Deserialize)]
pub struct AttachmentFixture {
    pub work_package: WorkPackageId,
    #[serde(flatten)]
    pub attachment: Attachment,
}

/// Timeline geometry; unset fields fall back to the editor config.
#[derive(Debug, Default, Deserialize)]
pub struct ScriptView {
    pub date_display_start: Option<NaiveDate>,
    pub pixels_per_day: Option<f64>,
    #[serde(default)]
    pub active_selection_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Start editing an unsaved work package of the given type.
    Create { type_href: String },
    Set {
        id: WorkPackageId,
        attribute: String,
        value: AttrValue,
    },
    Save { id: WorkPackageId },
    Reset { id: WorkPackageId },
    Stop { id: WorkPackageId },
    GroupDrop {
        id: WorkPackageId,
        attribute: Option<String>,
        #[serde(default)]
        groups: Vec<Group>,
        group: String,
    },
    Timeline {
        id: WorkPackageId,
        direction: DragDirection,
        from_x: f64,
        to_x: Option<f64>,
        /// Press escape instead of releasing the pointer.
        #[serde(default)]
        escape: bool,
        /// Rows shown in the table, refreshed after a commit.
        #[serde(default)]
        rendered: Vec<WorkPackageId>,
    },
    FilterDefaults {
        id: WorkPackageId,
        filters: Vec<QueryFilter>,
    },
    RemoveAttachment {
        id: WorkPackageId,
        attachment: String,
    },
}

impl Step {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Set { .. } => "set",
            Self::Save { .. } => "save",
            Self::Reset { .. } => "reset",
            Self::Stop { .. } => "stop",
            Self::GroupDrop { .. } => "group_drop",
            Self::Timeline { .. } => "timeline",
            Self::FilterDefaults { .. } => "filter_defaults",
            Self::RemoveAttachment { .. } => "remove_attachment",
        }
    }

    /// The work package the step acts on.
    pub fn target(&self) -> WorkPackageId {
        match self {
            Self::Create { .. } => WorkPackageId::unsaved(),
            Self::Set { id, .. }
            | Self::Save { id }
            | Self::Reset { id }
            | Self::Stop { id }
            | Self::GroupDrop { id, .. }
            | Self::Timeline { id, .. }
            | Self::FilterDefaults { id, .. }
            | Self::RemoveAttachment { id, .. } => id.clone(),
        }
    }
}

pub fn load_script(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse_from_tagged_json() {
        let script: Script = serde_json::from_str(
            r#"{
                "fixtures": {
                    "work_packages": [{ "id": "1", "typeHref": "/api/v3/types/1" }],
                    "attachments": [{ "work_package": "1", "id": "9", "fileName": "a.png" }]
                },
                "steps": [
                    { "op": "set", "id": "1", "attribute": "subject",
                      "value": { "kind": "text", "value": "Renamed" } },
                    { "op": "timeline", "id": "1", "direction": "both", "from_x": 10.0, "to_x": 50.0 },
                    { "op": "save", "id": "1" }
                ]
            }"#,
        )
        .expect("parse");

        assert_eq!(script.fixtures.work_packages.len(), 1);
        assert_eq!(script.fixtures.attachments[0].attachment.file_name, "a.png");
        let names: Vec<_> = script.steps.iter().map(Step::name).collect();
        assert_eq!(names, vec!["set", "timeline", "save"]);
        assert!(matches!(
            &script.steps[1],
            Step::Timeline { escape: false, to_x: Some(_), .. }
        ));
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        let err = serde_json::from_str::<Script>(r#"{ "stepz": [] }"#).expect_err("must fail");
        assert!(err.to_string().contains("stepz"));
    }

    #[test]
    fn create_targets_the_unsaved_id() {
        let step: Step =
            serde_json::from_str(r#"{ "op": "create", "type_href": "/api/v3/types/1" }"#)
                .expect("parse");
        assert!(step.target().is_new());
    }
}
