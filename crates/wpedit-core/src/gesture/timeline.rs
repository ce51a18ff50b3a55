//! Dragging and resizing work package bars on the timeline.
//!
//! The gesture is split in two:
//!
//! - [`TimelineDrag`] is a pure state machine over pointer and key events.
//!   It knows nothing about work packages beyond the leaf guard and emits
//!   [`TimelineIntent`]s.
//! - [`TimelineDriver`] binds those intents to the editing service. Previews
//!   write dates into the change-set through a [`DateRenderer`]; a commit
//!   saves and refreshes every rendered row updated since the save started;
//!   a cancel (or a commit with nothing changed) discards the edits without
//!   touching the network.
//!
//! ```text
//! idle ──down──▶ armed ──move──▶ dragging ──up──▶ committing ──finish──▶ idle
//!                  │                 │
//!                  └──esc/leave──────┴──────────▶ cancelled  ──finish──▶ idle
//! ```

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::changeset::{Changeset, ChangesetRef};
use crate::editing::{CommitRecord, EditingService};
use crate::error::EditError;
use crate::events::{DomainEvent, EventBus};
use crate::model::{AttrValue, DUE_DATE, START_DATE, Snapshot, WorkPackageId};
use crate::notify::Notifier;

// ---------------------------------------------------------------------------
// View parameters
// ---------------------------------------------------------------------------

/// Which dates a drag changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragDirection {
    /// Left handle: moves the start date.
    Left,
    /// Right handle: moves the due date.
    Right,
    /// Whole bar: moves both dates.
    Both,
    /// Click on an empty cell: start and due on the clicked day.
    Create,
    /// Drag on an empty cell: start on the pressed day, due under the cursor.
    DragRight,
}

impl DragDirection {
    /// Directions that start on an empty cell rather than on a bar.
    #[must_use]
    pub const fn creates_dates(self) -> bool {
        matches!(self, Self::Create | Self::DragRight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewParams {
    pub pixels_per_day: f64,
    /// Date at horizontal offset zero.
    pub date_display_start: NaiveDate,
    /// Relation selection mode lets parents be picked up too.
    #[serde(default)]
    pub active_selection_mode: bool,
}

/// Rejected timeline scale.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("pixels per day must be a positive finite number, got {0}")]
pub struct InvalidScale(pub f64);

impl ViewParams {
    pub fn new(pixels_per_day: f64, date_display_start: NaiveDate) -> Result<Self, InvalidScale> {
        if !is_valid_scale(pixels_per_day) {
            return Err(InvalidScale(pixels_per_day));
        }
        Ok(Self {
            pixels_per_day,
            date_display_start,
            active_selection_mode: false,
        })
    }

    /// Whole days between offset zero and `x` pixels. Offsets past the `i64`
    /// range saturate; an invalid scale or a non-finite `x` yields 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn day_offset(&self, x: f64) -> i64 {
        if !is_valid_scale(self.pixels_per_day) {
            return 0;
        }
        (x / self.pixels_per_day).floor() as i64
    }

    #[must_use]
    pub fn date_at(&self, x: f64) -> NaiveDate {
        shift(self.date_display_start, self.day_offset(x))
    }
}

fn is_valid_scale(pixels_per_day: f64) -> bool {
    pixels_per_day.is_finite() && pixels_per_day > 0.0
}

/// `date` moved by `days`, or unchanged when the result is out of range.
fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(date)
}

// ---------------------------------------------------------------------------
// TimelineDrag
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Armed {
        direction: DragDirection,
        start_day: i64,
    },
    Dragging {
        direction: DragDirection,
        start_day: i64,
        days: i64,
    },
    Committing,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineIntent {
    /// Show the bar moved by `days` from where the drag started.
    PreviewDates {
        direction: DragDirection,
        days: i64,
        day_under_cursor: NaiveDate,
    },
    Commit,
    Cancel,
}

#[derive(Debug, Clone)]
pub struct TimelineDrag {
    view: ViewParams,
    state: DragState,
}

impl TimelineDrag {
    #[must_use]
    pub const fn new(view: ViewParams) -> Self {
        Self {
            view,
            state: DragState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> DragState {
        self.state
    }

    #[must_use]
    pub const fn view(&self) -> &ViewParams {
        &self.view
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self.state,
            DragState::Armed { .. } | DragState::Dragging { .. }
        )
    }

    /// Press at `x` pixels. Parents only move in selection mode and dates
    /// are only created on leaves. Returns the intents to apply right away.
    pub fn pointer_down(
        &mut self,
        is_leaf: bool,
        direction: DragDirection,
        x: f64,
    ) -> Vec<TimelineIntent> {
        if self.state != DragState::Idle {
            return Vec::new();
        }
        let allowed = if direction.creates_dates() {
            is_leaf
        } else {
            is_leaf || self.view.active_selection_mode
        };
        if !allowed {
            trace!(?direction, "pointer down ignored on non-leaf");
            return Vec::new();
        }

        let start_day = self.view.day_offset(x);
        let day_under_cursor = self.view.date_at(x);
        match direction {
            DragDirection::Create => {
                self.state = DragState::Committing;
                vec![
                    TimelineIntent::PreviewDates {
                        direction,
                        days: 0,
                        day_under_cursor,
                    },
                    TimelineIntent::Commit,
                ]
            }
            DragDirection::DragRight => {
                self.state = DragState::Armed {
                    direction,
                    start_day,
                };
                vec![TimelineIntent::PreviewDates {
                    direction,
                    days: 0,
                    day_under_cursor,
                }]
            }
            DragDirection::Left | DragDirection::Right | DragDirection::Both => {
                self.state = DragState::Armed {
                    direction,
                    start_day,
                };
                Vec::new()
            }
        }
    }

    pub fn pointer_move(&mut self, x: f64) -> Option<TimelineIntent> {
        let (direction, start_day) = match self.state {
            DragState::Armed {
                direction,
                start_day,
            }
            | DragState::Dragging {
                direction,
                start_day,
                ..
            } => (direction, start_day),
            _ => return None,
        };
        let days = self.view.day_offset(x).saturating_sub(start_day);
        self.state = DragState::Dragging {
            direction,
            start_day,
            days,
        };
        Some(TimelineIntent::PreviewDates {
            direction,
            days,
            day_under_cursor: self.view.date_at(x),
        })
    }

    pub fn pointer_up(&mut self) -> Option<TimelineIntent> {
        if !self.is_active() {
            return None;
        }
        self.state = DragState::Committing;
        Some(TimelineIntent::Commit)
    }

    pub fn escape(&mut self) -> Option<TimelineIntent> {
        if !self.is_active() {
            return None;
        }
        self.state = DragState::Cancelled;
        Some(TimelineIntent::Cancel)
    }

    /// Leaving the cell only aborts drags that started on an empty cell.
    pub fn pointer_leave(&mut self) -> Option<TimelineIntent> {
        match self.state {
            DragState::Armed { direction, .. } | DragState::Dragging { direction, .. }
                if direction.creates_dates() =>
            {
                self.state = DragState::Cancelled;
                Some(TimelineIntent::Cancel)
            }
            _ => None,
        }
    }

    /// Back to idle once a commit or cancel has been handled.
    pub fn finish(&mut self) {
        self.state = DragState::Idle;
    }
}

// ---------------------------------------------------------------------------
// Date renderers
// ---------------------------------------------------------------------------

/// Dates a drag produced; `None` leaves the attribute untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateValues {
    pub start: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
}

/// Maps drag distance to date attributes for one kind of timeline cell.
pub trait DateRenderer: Send + Sync {
    /// Dates for a drag of `days` whole days relative to `pristine`.
    fn on_days_moved(
        &self,
        pristine: &Snapshot,
        day_under_cursor: NaiveDate,
        days: i64,
        direction: DragDirection,
    ) -> DateValues;

    /// Write `dates` into the change-set.
    fn assign_date_values(&self, changeset: &ChangesetRef, dates: &DateValues);
}

/// Renderer for regular work packages with `startDate` and `dueDate`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkPackageDateRenderer;

impl DateRenderer for WorkPackageDateRenderer {
    fn on_days_moved(
        &self,
        pristine: &Snapshot,
        day_under_cursor: NaiveDate,
        days: i64,
        direction: DragDirection,
    ) -> DateValues {
        let start = pristine.value(START_DATE).as_date();
        let due = pristine.value(DUE_DATE).as_date();
        match direction {
            DragDirection::Left => {
                let moved = start.map(|s| shift(s, days));
                DateValues {
                    start: match (moved, due) {
                        (Some(s), Some(d)) => Some(s.min(d)),
                        (moved, _) => moved,
                    },
                    due: None,
                }
            }
            DragDirection::Right => {
                let moved = due.map(|d| shift(d, days));
                DateValues {
                    start: None,
                    due: match (start, moved) {
                        (Some(s), Some(d)) => Some(d.max(s)),
                        (_, moved) => moved,
                    },
                }
            }
            DragDirection::Both => DateValues {
                start: start.map(|s| shift(s, days)),
                due: due.map(|d| shift(d, days)),
            },
            DragDirection::Create => DateValues {
                start: Some(day_under_cursor),
                due: Some(day_under_cursor),
            },
            DragDirection::DragRight => {
                let pressed = shift(day_under_cursor, days.saturating_neg());
                DateValues {
                    start: Some(pressed.min(day_under_cursor)),
                    due: Some(pressed.max(day_under_cursor)),
                }
            }
        }
    }

    fn assign_date_values(&self, changeset: &ChangesetRef, dates: &DateValues) {
        changeset.modify(|current| {
            if let Some(start) = dates.start {
                current.set_value(START_DATE, AttrValue::Date(start));
            }
            if let Some(due) = dates.due {
                current.set_value(DUE_DATE, AttrValue::Date(due));
            }
        });
    }
}

// ---------------------------------------------------------------------------
// TimelineDriver
// ---------------------------------------------------------------------------

/// How a finished drag ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineOutcome {
    Saved(CommitRecord),
    /// Committed without any date change; nothing was sent.
    NoChange,
    Cancelled,
    /// The save failed; the notifier has been told.
    Failed,
}

/// One timeline row bound to the editing service.
pub struct TimelineDriver<'a> {
    service: &'a EditingService,
    notifier: &'a dyn Notifier,
    renderer: Box<dyn DateRenderer + 'a>,
    events: Option<EventBus>,
    notify_success: bool,
    drag: TimelineDrag,
    work_package: Arc<Snapshot>,
    changeset: ChangesetRef,
    rendered: Vec<WorkPackageId>,
}

impl<'a> TimelineDriver<'a> {
    /// `rendered` lists every work package currently shown in the table;
    /// they are refreshed after a successful save.
    #[must_use]
    pub fn new(
        service: &'a EditingService,
        notifier: &'a dyn Notifier,
        view: ViewParams,
        work_package: Arc<Snapshot>,
        rendered: Vec<WorkPackageId>,
    ) -> Self {
        // Registered with the service only once a drag actually starts.
        let changeset = ChangesetRef::new(Changeset::new(Arc::clone(&work_package), None));
        Self {
            service,
            notifier,
            renderer: Box::new(WorkPackageDateRenderer),
            events: None,
            notify_success: true,
            drag: TimelineDrag::new(view),
            work_package,
            changeset,
            rendered,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn DateRenderer + 'a>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub const fn with_notify_success(mut self, notify_success: bool) -> Self {
        self.notify_success = notify_success;
        self
    }

    #[must_use]
    pub const fn drag(&self) -> &TimelineDrag {
        &self.drag
    }

    #[must_use]
    pub const fn changeset(&self) -> &ChangesetRef {
        &self.changeset
    }

    /// What the bar shows right now.
    #[must_use]
    pub fn displayed(&self) -> Arc<Snapshot> {
        self.service
            .temporary_edit_resource(&self.work_package.id)
            .value_or(&self.work_package)
    }

    pub async fn pointer_down(
        &mut self,
        direction: DragDirection,
        x: f64,
    ) -> Option<TimelineOutcome> {
        if let Some(cached) = self.service.cache().get(&self.work_package.id) {
            self.work_package = cached;
        }
        let intents = self
            .drag
            .pointer_down(self.work_package.is_leaf, direction, x);
        if self.drag.state() != DragState::Idle {
            self.changeset = self.service.change_for(&self.work_package, None);
        }
        let mut outcome = None;
        for intent in intents {
            outcome = self.apply(intent).await;
        }
        outcome
    }

    pub fn pointer_move(&mut self, x: f64) {
        if let Some(intent) = self.drag.pointer_move(x) {
            self.preview(intent);
        }
    }

    pub async fn pointer_up(&mut self) -> Option<TimelineOutcome> {
        match self.drag.pointer_up() {
            Some(intent) => self.apply(intent).await,
            None => None,
        }
    }

    pub async fn escape(&mut self) -> Option<TimelineOutcome> {
        match self.drag.escape() {
            Some(intent) => self.apply(intent).await,
            None => None,
        }
    }

    pub async fn pointer_leave(&mut self) -> Option<TimelineOutcome> {
        match self.drag.pointer_leave() {
            Some(intent) => self.apply(intent).await,
            None => None,
        }
    }

    async fn apply(&mut self, intent: TimelineIntent) -> Option<TimelineOutcome> {
        match intent {
            TimelineIntent::PreviewDates { .. } => {
                self.preview(intent);
                None
            }
            TimelineIntent::Commit => Some(self.deactivate(false).await),
            TimelineIntent::Cancel => Some(self.deactivate(true).await),
        }
    }

    fn preview(&self, intent: TimelineIntent) {
        let TimelineIntent::PreviewDates {
            direction,
            days,
            day_under_cursor,
        } = intent
        else {
            return;
        };
        let pristine = Arc::clone(self.changeset.lock().pristine());
        let dates = self
            .renderer
            .on_days_moved(&pristine, day_under_cursor, days, direction);
        trace!(id = %pristine.id, ?direction, days, ?dates, "timeline preview");
        self.renderer.assign_date_values(&self.changeset, &dates);
    }

    async fn deactivate(&mut self, cancelled: bool) -> TimelineOutcome {
        let outcome = if cancelled || self.changeset.is_empty() {
            self.service.reset(&self.changeset);
            debug!(id = %self.work_package.id, cancelled, "timeline drag discarded");
            if cancelled {
                TimelineOutcome::Cancelled
            } else {
                TimelineOutcome::NoChange
            }
        } else {
            let outcome = self.save().await;
            self.service.reset(&self.changeset);
            outcome
        };

        if let Some(cached) = self.service.cache().get(&self.work_package.id) {
            self.work_package = cached;
        }
        self.drag.finish();
        outcome
    }

    async fn save(&self) -> TimelineOutcome {
        let since = Utc::now();
        let commit = match self.service.save(&self.changeset).await {
            Ok(commit) => commit,
            Err(err) => {
                self.notifier.handle_raw_error(&err, &self.work_package.id);
                return TimelineOutcome::Failed;
            }
        };
        if self.notify_success {
            self.notifier.show_save(&commit.work_package);
        }

        match self
            .service
            .api()
            .load_ids_updated_since(&self.rendered, since)
            .await
        {
            Ok(updated) => {
                debug!(id = %commit.id, refreshed = updated.len(), "rendered rows refreshed");
                self.service.cache().put_all(updated);
                if let Some(events) = &self.events {
                    events.publish(DomainEvent::Updated {
                        id: commit.id.clone(),
                    });
                }
            }
            Err(err) => {
                self.notifier
                    .handle_raw_error(&EditError::Api(err), &self.work_package.id);
            }
        }
        TimelineOutcome::Saved(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn view() -> ViewParams {
        ViewParams::new(30.0, date(2024, 1, 1)).expect("valid scale")
    }

    fn bar() -> Snapshot {
        Snapshot::new("9", "/api/v3/types/1")
            .with(START_DATE, AttrValue::Date(date(2024, 1, 10)))
            .with(DUE_DATE, AttrValue::Date(date(2024, 1, 12)))
    }

    #[test]
    fn days_are_floored_pixel_offsets() {
        let view = view();
        assert_eq!(view.day_offset(0.0), 0);
        assert_eq!(view.day_offset(29.9), 0);
        assert_eq!(view.day_offset(30.0), 1);
        assert_eq!(view.day_offset(-1.0), -1);
        assert_eq!(view.date_at(95.0), date(2024, 1, 4));
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        assert_eq!(
            ViewParams::new(0.0, date(2024, 1, 1)),
            Err(InvalidScale(0.0))
        );
        assert!(ViewParams::new(-4.0, date(2024, 1, 1)).is_err());
        assert!(ViewParams::new(f64::NAN, date(2024, 1, 1)).is_err());
        assert!(ViewParams::new(f64::INFINITY, date(2024, 1, 1)).is_err());
    }

    #[test]
    fn zero_scale_built_directly_stays_on_day_zero() {
        let mut drag = TimelineDrag::new(ViewParams {
            pixels_per_day: 0.0,
            ..view()
        });
        assert!(drag.pointer_down(true, DragDirection::Both, 10.0).is_empty());
        assert_eq!(drag.view().date_at(10.0), date(2024, 1, 1));
        let preview = drag.pointer_move(500.0);
        assert!(matches!(
            preview,
            Some(TimelineIntent::PreviewDates { days: 0, .. })
        ));
    }

    #[test]
    fn huge_offsets_saturate_without_panicking() {
        let view = view();
        assert_eq!(view.day_offset(1e300), i64::MAX);
        assert_eq!(view.day_offset(-1e300), i64::MIN);
        assert_eq!(view.date_at(1e16), date(2024, 1, 1));

        let mut drag = TimelineDrag::new(view);
        drag.pointer_down(true, DragDirection::Both, 1e16);
        let Some(TimelineIntent::PreviewDates { days, .. }) = drag.pointer_move(-1e300) else {
            panic!("expected a preview");
        };
        assert_eq!(days, i64::MIN);

        let dates =
            WorkPackageDateRenderer.on_days_moved(&bar(), date(2024, 1, 1), days, DragDirection::Both);
        assert_eq!(dates.start, Some(date(2024, 1, 10)));
        let dates = WorkPackageDateRenderer.on_days_moved(
            &bar(),
            date(2024, 1, 1),
            i64::MIN,
            DragDirection::DragRight,
        );
        assert_eq!(dates.start, Some(date(2024, 1, 1)));
    }

    #[test]
    fn drag_walks_through_states() {
        let mut drag = TimelineDrag::new(view());
        assert!(drag.pointer_down(true, DragDirection::Both, 100.0).is_empty());
        assert_eq!(
            drag.state(),
            DragState::Armed {
                direction: DragDirection::Both,
                start_day: 3
            }
        );

        let preview = drag.pointer_move(165.0);
        assert_eq!(
            preview,
            Some(TimelineIntent::PreviewDates {
                direction: DragDirection::Both,
                days: 2,
                day_under_cursor: date(2024, 1, 6),
            })
        );
        assert_eq!(drag.pointer_up(), Some(TimelineIntent::Commit));
        assert_eq!(drag.state(), DragState::Committing);
        drag.finish();
        assert_eq!(drag.state(), DragState::Idle);
    }

    #[test]
    fn escape_cancels_active_drag() {
        let mut drag = TimelineDrag::new(view());
        drag.pointer_down(true, DragDirection::Left, 0.0);
        drag.pointer_move(60.0);
        assert_eq!(drag.escape(), Some(TimelineIntent::Cancel));
        assert_eq!(drag.state(), DragState::Cancelled);
        assert_eq!(drag.pointer_up(), None);
    }

    #[test]
    fn parents_only_move_in_selection_mode() {
        let mut drag = TimelineDrag::new(view());
        drag.pointer_down(false, DragDirection::Both, 0.0);
        assert_eq!(drag.state(), DragState::Idle);
        assert_eq!(drag.pointer_move(90.0), None);

        let mut selecting = TimelineDrag::new(ViewParams {
            active_selection_mode: true,
            ..view()
        });
        selecting.pointer_down(false, DragDirection::Both, 0.0);
        assert!(selecting.is_active());
    }

    #[test]
    fn create_click_commits_immediately() {
        let mut drag = TimelineDrag::new(view());
        let intents = drag.pointer_down(true, DragDirection::Create, 45.0);
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[1], TimelineIntent::Commit);
        assert_eq!(drag.state(), DragState::Committing);
    }

    #[test]
    fn leaving_only_cancels_empty_cell_drags() {
        let mut bar_drag = TimelineDrag::new(view());
        bar_drag.pointer_down(true, DragDirection::Right, 0.0);
        assert_eq!(bar_drag.pointer_leave(), None);

        let mut create = TimelineDrag::new(view());
        create.pointer_down(true, DragDirection::DragRight, 0.0);
        assert_eq!(create.pointer_leave(), Some(TimelineIntent::Cancel));
    }

    #[test]
    fn renderer_moves_both_dates() {
        let dates =
            WorkPackageDateRenderer.on_days_moved(&bar(), date(2024, 1, 1), 3, DragDirection::Both);
        assert_eq!(dates.start, Some(date(2024, 1, 13)));
        assert_eq!(dates.due, Some(date(2024, 1, 15)));
    }

    #[test]
    fn left_handle_never_passes_due_date() {
        let dates =
            WorkPackageDateRenderer.on_days_moved(&bar(), date(2024, 1, 1), 5, DragDirection::Left);
        assert_eq!(dates.start, Some(date(2024, 1, 12)));
        assert_eq!(dates.due, None);
    }

    #[test]
    fn right_handle_never_passes_start_date() {
        let dates = WorkPackageDateRenderer.on_days_moved(
            &bar(),
            date(2024, 1, 1),
            -5,
            DragDirection::Right,
        );
        assert_eq!(dates.start, None);
        assert_eq!(dates.due, Some(date(2024, 1, 10)));
    }

    #[test]
    fn drag_right_spans_press_to_cursor() {
        let empty = Snapshot::new("9", "/api/v3/types/1");
        let dates = WorkPackageDateRenderer.on_days_moved(
            &empty,
            date(2024, 1, 8),
            3,
            DragDirection::DragRight,
        );
        assert_eq!(dates.start, Some(date(2024, 1, 5)));
        assert_eq!(dates.due, Some(date(2024, 1, 8)));
    }
}
