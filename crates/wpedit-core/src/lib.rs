//! wpedit-core library.
//!
//! Client-side editing lifecycle for work packages: a keyed resource cache
//! of server snapshots, per-entity change-sets, the editing service that
//! saves them, and the gesture mappers (group-by drag, timeline drag, card
//! reorder) that write attributes as a side effect of direct manipulation.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums in the library, each mapped to an
//!   [`error::ErrorCode`]; `anyhow::Result` for config loading and hooks.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod api;
pub mod attachments;
pub mod cache;
pub mod changeset;
pub mod config;
pub mod editing;
pub mod error;
pub mod events;
pub mod field;
pub mod filter_values;
pub mod gesture;
pub mod hooks;
pub mod memory;
pub mod model;
pub mod notify;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use api::{ApiError, WorkPackageApi};
pub use changeset::{Changeset, ChangesetRef, RequestPayload};
pub use editing::{CommitRecord, EditResourceView, EditingService};
pub use error::{EditError, ErrorCode, ValidationErrors};
pub use memory::InMemoryApi;
pub use model::{AttrValue, Link, Schema, Snapshot, WorkPackageId};
pub use notify::{Notifier, TracingNotifier};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
