//! Seam to the REST API that owns work packages.
//!
//! The editing layer never talks HTTP itself. Everything it needs from the
//! server goes through [`WorkPackageApi`]: fetching representations and
//! schemas, the `updateImmediately` action, the "updated since" query used
//! to refresh dependent rows, and attachment deletion.
//! [`crate::memory::InMemoryApi`] is the implementation used by tests and the
//! replay CLI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::attachments::Attachment;
use crate::changeset::RequestPayload;
use crate::error::{ErrorCode, ValidationErrors};
use crate::model::{LockVersion, Schema, Snapshot, WorkPackageId};

/// Transport and server-side failures. Never retried by this crate.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("work package {id} was updated concurrently (sent lock version {sent}, current {current})")]
    Conflict {
        id: WorkPackageId,
        sent: LockVersion,
        current: LockVersion,
    },

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },

    /// The server returned a validation-error payload.
    #[error("server rejected the payload: {0}")]
    Rejected(ValidationErrors),
}

impl ApiError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::TransportFailed,
            Self::Status { .. } | Self::Rejected(_) => ErrorCode::ServerRejected,
            Self::Conflict { .. } => ErrorCode::VersionConflict,
            Self::NotFound { .. } => ErrorCode::NotFound,
        }
    }
}

/// Abstraction over the work package API for testability.
/// Real implementation: an HTTP client. Test double: `InMemoryApi`.
#[async_trait]
pub trait WorkPackageApi: Send + Sync {
    async fn fetch(&self, id: &WorkPackageId) -> Result<Snapshot, ApiError>;

    async fn fetch_schema(&self, type_href: &str) -> Result<Schema, ApiError>;

    /// Submit `payload` against `pristine` and return the saved
    /// representation. Creates the work package when `pristine` is unsaved.
    async fn update_immediately(
        &self,
        pristine: &Snapshot,
        payload: &RequestPayload,
    ) -> Result<Snapshot, ApiError>;

    /// Representations of those `ids` modified at or after `since`.
    async fn load_ids_updated_since(
        &self,
        ids: &[WorkPackageId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>, ApiError>;

    async fn delete_attachment(&self, attachment: &Attachment) -> Result<(), ApiError>;
}
