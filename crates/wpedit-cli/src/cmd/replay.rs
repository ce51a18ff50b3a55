use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use wpedit_core::attachments::{AttachmentCollection, remove_attachment};
use wpedit_core::cache::{ActivityCache, ResourceCache, SchemaCache};
use wpedit_core::config::{EditorConfig, load_editor_config};
use wpedit_core::events::{DomainEvent, EventBus};
use wpedit_core::filter_values::apply_defaults_from_filters;
use wpedit_core::gesture::{GroupByDrag, TimelineDriver, TimelineOutcome, ViewParams};
use wpedit_core::hooks::default_hooks;
use wpedit_core::{
    AttrValue, ChangesetRef, CommitRecord, EditError, EditingService, InMemoryApi, Notifier,
    Snapshot, TracingNotifier, WorkPackageId,
};

use crate::output::{OutputMode, kv, render, rule, section};
use crate::script::{Script, Step, load_script};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Path to the replay script (JSON)
    pub script: PathBuf,

    /// Exit with an error when any step fails
    #[arg(long)]
    pub strict: bool,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum StepResult {
    Committed {
        id: WorkPackageId,
        was_new: bool,
        lock_version: u64,
        changes: BTreeMap<String, AttrValue>,
    },
    Failed {
        code: String,
        message: String,
    },
    Modified {
        attributes: Vec<String>,
    },
    Cleared,
    Cancelled,
    NoChange,
    Removed,
}

impl StepResult {
    fn committed(commit: &CommitRecord) -> Self {
        Self::Committed {
            id: commit.id.clone(),
            was_new: commit.was_new,
            lock_version: commit.work_package.lock_version,
            changes: commit.changes.clone(),
        }
    }

    fn failed(error: &EditError) -> Self {
        Self::Failed {
            code: error.code().code().to_string(),
            message: error.to_string(),
        }
    }

    const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Serialize)]
struct StepReport {
    index: usize,
    op: &'static str,
    id: WorkPackageId,
    #[serde(flatten)]
    result: StepResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NotificationEntry {
    Saved { id: WorkPackageId },
    Error {
        id: WorkPackageId,
        code: String,
        message: String,
    },
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    script: String,
    steps: Vec<StepReport>,
    failed: usize,
    notifications: Vec<NotificationEntry>,
    events: Vec<DomainEvent>,
    work_packages: Vec<Snapshot>,
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Logs every notification and keeps it for the report.
#[derive(Default)]
struct ReplayNotifier {
    entries: Mutex<Vec<NotificationEntry>>,
}

impl ReplayNotifier {
    fn entries(&self) -> Vec<NotificationEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn last_error(&self) -> Option<StepResult> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find_map(|entry| match entry {
                NotificationEntry::Error { code, message, .. } => Some(StepResult::Failed {
                    code: code.clone(),
                    message: message.clone(),
                }),
                NotificationEntry::Saved { .. } => None,
            })
    }

    fn push(&self, entry: NotificationEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl Notifier for ReplayNotifier {
    fn show_save(&self, saved: &Snapshot) {
        TracingNotifier.show_save(saved);
        self.push(NotificationEntry::Saved {
            id: saved.id.clone(),
        });
    }

    fn handle_raw_error(&self, error: &EditError, id: &WorkPackageId) {
        TracingNotifier.handle_raw_error(error, id);
        self.push(NotificationEntry::Error {
            id: id.clone(),
            code: error.code().code().to_string(),
            message: error.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
    api: Arc<InMemoryApi>,
    service: EditingService,
    notifier: ReplayNotifier,
    bus: EventBus,
    view: ViewParams,
    notify_success: bool,
    attachments: BTreeMap<WorkPackageId, AttachmentCollection>,
}

impl Session {
    fn new(script: &Script, config: &EditorConfig) -> Result<Self> {
        let api = Arc::new(InMemoryApi::new());
        for schema in &script.fixtures.schemas {
            api.insert_schema(schema.clone());
        }
        for work_package in &script.fixtures.work_packages {
            api.insert(work_package.clone());
        }

        let mut attachments: BTreeMap<WorkPackageId, AttachmentCollection> = BTreeMap::new();
        for fixture in &script.fixtures.attachments {
            api.insert_attachment(&fixture.attachment);
            attachments
                .entry(fixture.work_package.clone())
                .or_insert_with(|| AttachmentCollection::new(fixture.work_package.clone(), vec![]))
                .elements
                .push(fixture.attachment.clone());
        }

        let bus = EventBus::default();
        let activity = Arc::new(ActivityCache::new());
        let service = EditingService::new(
            api.clone(),
            Arc::new(ResourceCache::new()),
            Arc::new(SchemaCache::new()),
        )
        .with_hooks(default_hooks(&config.hooks, &activity, &bus));

        let mut view = ViewParams::new(
            script
                .view
                .pixels_per_day
                .unwrap_or(config.timeline.pixels_per_day),
            script
                .view
                .date_display_start
                .unwrap_or_else(|| Utc::now().date_naive()),
        )
        .context("Invalid view.pixels_per_day in replay script")?;
        view.active_selection_mode = script.view.active_selection_mode;

        Ok(Self {
            api,
            service,
            notifier: ReplayNotifier::default(),
            bus,
            view,
            notify_success: config.save.notify_success,
            attachments,
        })
    }

    /// The registered change-set for `id`, or a new one loaded from the API.
    async fn changeset(&self, id: &WorkPackageId) -> Result<ChangesetRef, EditError> {
        if let Some(existing) = self.service.existing_change(id) {
            return Ok(existing);
        }
        Ok(self.service.change_for_id(id).await?)
    }

    async fn load(&self, id: &WorkPackageId) -> Result<Arc<Snapshot>, EditError> {
        Ok(self.service.load(id).await?)
    }

    #[instrument(skip_all, fields(op = step.name(), id = %step.target()))]
    async fn run(&mut self, step: &Step) -> StepResult {
        match self.run_step(step).await {
            Ok(result) => result,
            Err(err) => {
                warn!(code = %err.code(), %err, "step failed");
                StepResult::failed(&err)
            }
        }
    }

    async fn run_step(&mut self, step: &Step) -> Result<StepResult, EditError> {
        match step {
            Step::Create { type_href } => {
                self.service
                    .schemas()
                    .ensure_loaded(self.service.api().as_ref(), type_href)
                    .await?;
                let fresh = Arc::new(Snapshot::unsaved(type_href.clone()));
                self.service.change_for(&fresh, None);
                Ok(StepResult::Modified { attributes: vec![] })
            }
            Step::Set {
                id,
                attribute,
                value,
            } => {
                let changeset = self.changeset(id).await?;
                changeset.set_value(attribute.clone(), value.clone());
                Ok(modified(&changeset))
            }
            Step::Save { id } => {
                let changeset = self.changeset(id).await?;
                let commit = self.service.save(&changeset).await?;
                if self.notify_success {
                    self.notifier.show_save(&commit.work_package);
                }
                Ok(StepResult::committed(&commit))
            }
            Step::Reset { id } => {
                let Some(changeset) = self.service.existing_change(id) else {
                    return Ok(StepResult::NoChange);
                };
                self.service.reset(&changeset);
                Ok(StepResult::Cleared)
            }
            Step::Stop { id } => {
                self.service.stop_editing(id);
                Ok(StepResult::Cleared)
            }
            Step::GroupDrop {
                id,
                attribute,
                groups,
                group,
            } => {
                let work_package = self.load(id).await?;
                let drag = GroupByDrag::new(attribute.clone(), groups.clone());
                if !drag.applies() {
                    return Ok(StepResult::NoChange);
                }
                let commit = drag
                    .handle_drop(&self.service, &self.notifier, &work_package, group)
                    .await;
                Ok(commit.map_or_else(
                    || self.failure_from_notifier(),
                    |commit| StepResult::committed(&commit),
                ))
            }
            Step::Timeline {
                id,
                direction,
                from_x,
                to_x,
                escape,
                rendered,
            } => {
                let work_package = self.load(id).await?;
                let mut driver = TimelineDriver::new(
                    &self.service,
                    &self.notifier,
                    self.view,
                    work_package,
                    rendered.clone(),
                )
                .with_events(self.bus.clone())
                .with_notify_success(self.notify_success);

                let mut outcome = driver.pointer_down(*direction, *from_x).await;
                if outcome.is_none() {
                    if let Some(x) = to_x {
                        driver.pointer_move(*x);
                    }
                    outcome = if *escape {
                        driver.escape().await
                    } else {
                        driver.pointer_up().await
                    };
                }
                Ok(match outcome {
                    Some(TimelineOutcome::Saved(commit)) => StepResult::committed(&commit),
                    Some(TimelineOutcome::Cancelled) => StepResult::Cancelled,
                    Some(TimelineOutcome::Failed) => self.failure_from_notifier(),
                    Some(TimelineOutcome::NoChange) | None => StepResult::NoChange,
                })
            }
            Step::FilterDefaults { id, filters } => {
                let changeset = self.changeset(id).await?;
                let type_href = changeset.lock().pristine().type_href.clone();
                let schema = self
                    .service
                    .schemas()
                    .ensure_loaded(self.service.api().as_ref(), &type_href)
                    .await?;
                let applied =
                    changeset.modify(|current| apply_defaults_from_filters(current, &schema, filters));
                debug!(%id, applied, "filter defaults applied");
                Ok(modified(&changeset))
            }
            Step::RemoveAttachment { id, attachment } => {
                let Some(collection) = self.attachments.get_mut(id) else {
                    return Ok(StepResult::NoChange);
                };
                let Some(target) = collection
                    .elements
                    .iter()
                    .find(|element| &element.id == attachment)
                    .cloned()
                else {
                    return Ok(StepResult::NoChange);
                };
                let removed = remove_attachment(
                    collection,
                    &target,
                    self.service.api().as_ref(),
                    &self.notifier,
                )
                .await;
                Ok(if removed {
                    StepResult::Removed
                } else {
                    self.failure_from_notifier()
                })
            }
        }
    }

    fn failure_from_notifier(&self) -> StepResult {
        self.notifier
            .last_error()
            .unwrap_or_else(|| StepResult::Failed {
                code: String::new(),
                message: "failed without a notification".to_string(),
            })
    }

    /// Server state of every fixture and every work package saved since.
    fn final_work_packages(&self, ids: &BTreeSet<WorkPackageId>) -> Vec<Snapshot> {
        ids.iter().filter_map(|id| self.api.stored(id)).collect()
    }
}

fn modified(changeset: &ChangesetRef) -> StepResult {
    let attributes = changeset
        .lock()
        .changed_attributes()
        .into_iter()
        .map(str::to_string)
        .collect();
    StepResult::Modified { attributes }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

pub async fn run_replay(args: &ReplayArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let script = load_script(&args.script)?;
    let config = load_editor_config(project_root)?;
    let mut session = Session::new(&script, &config)?;
    let mut events = session.bus.subscribe();

    info!(
        script = %args.script.display(),
        steps = script.steps.len(),
        "replaying editing session"
    );

    let mut ids: BTreeSet<WorkPackageId> = script
        .fixtures
        .work_packages
        .iter()
        .map(|wp| wp.id.clone())
        .collect();

    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let result = session.run(step).await;
        if let StepResult::Committed { id, .. } = &result {
            ids.insert(id.clone());
        }
        steps.push(StepReport {
            index,
            op: step.name(),
            id: step.target(),
            result,
        });
    }

    let mut published = Vec::new();
    while let Ok(event) = events.try_recv() {
        published.push(event);
    }

    let failed = steps.iter().filter(|s| s.result.is_failure()).count();
    let report = ReplayReport {
        script: args.script.display().to_string(),
        steps,
        failed,
        notifications: session.notifier.entries(),
        events: published,
        work_packages: session.final_work_packages(&ids),
    };

    render(output, &report, print_report)?;

    if args.strict && failed > 0 {
        bail!("{failed} of {} step(s) failed", report.steps.len());
    }
    Ok(())
}

fn print_report(report: &ReplayReport, w: &mut dyn Write) -> std::io::Result<()> {
    section(w, &format!("Replay {}", report.script))?;
    for step in &report.steps {
        writeln!(
            w,
            "{:>3}  {:<18} {:<8} {}",
            step.index,
            step.op,
            step.id.as_str(),
            describe(&step.result)
        )?;
    }
    rule(w)?;
    kv(w, "steps", report.steps.len().to_string())?;
    kv(w, "failed", report.failed.to_string())?;
    kv(w, "notifications", report.notifications.len().to_string())?;
    kv(w, "events", report.events.len().to_string())?;

    if !report.work_packages.is_empty() {
        writeln!(w)?;
        section(w, "Work packages")?;
        for wp in &report.work_packages {
            writeln!(
                w,
                "{:<8} v{:<4} {}",
                wp.id.as_str(),
                wp.lock_version,
                wp.subject().unwrap_or("")
            )?;
        }
    }
    Ok(())
}

fn describe(result: &StepResult) -> String {
    match result {
        StepResult::Committed {
            id,
            was_new,
            lock_version,
            changes,
        } => {
            let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
            let created = if *was_new { " (created)" } else { "" };
            format!(
                "committed {id}{created} v{lock_version} [{}]",
                keys.join(", ")
            )
        }
        StepResult::Failed { code, message } => format!("FAILED {code}: {message}"),
        StepResult::Modified { attributes } => format!("modified [{}]", attributes.join(", ")),
        StepResult::Cleared => "cleared".to_string(),
        StepResult::Cancelled => "cancelled".to_string(),
        StepResult::NoChange => "no change".to_string(),
        StepResult::Removed => "removed".to_string(),
    }
}
