//! User-facing notifications for save outcomes.

use std::sync::Mutex;

use tracing::{error, info};

use crate::error::EditError;
use crate::lock;
use crate::model::{Snapshot, WorkPackageId};

/// Sink for save confirmations and the generic error notifier.
pub trait Notifier: Send + Sync {
    fn show_save(&self, saved: &Snapshot);

    fn handle_raw_error(&self, error: &EditError, id: &WorkPackageId);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show_save(&self, saved: &Snapshot) {
        info!(id = %saved.id, lock_version = saved.lock_version, "work package saved");
    }

    fn handle_raw_error(&self, error: &EditError, id: &WorkPackageId) {
        error!(%id, code = %error.code(), %error, "work package update failed");
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Saved { id: WorkPackageId },
    Error { id: WorkPackageId, code: &'static str, message: String },
}

/// Notifier that keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.entries).clone()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|n| matches!(n, Notification::Error { .. }))
            .count()
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|n| matches!(n, Notification::Saved { .. }))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn show_save(&self, saved: &Snapshot) {
        lock(&self.entries).push(Notification::Saved {
            id: saved.id.clone(),
        });
    }

    fn handle_raw_error(&self, error: &EditError, id: &WorkPackageId) {
        lock(&self.entries).push(Notification::Error {
            id: id.clone(),
            code: error.code().code(),
            message: error.to_string(),
        });
    }
}
