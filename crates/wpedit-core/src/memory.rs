//! In-memory implementation of [`WorkPackageApi`].
//!
//! Behaves like the server for everything the editing layer relies on:
//! lock-version conflicts are rejected, new work packages get sequential
//! ids, every save bumps the lock version and `updated_at`, and saving a
//! child touches its parent the way rolled-up dates would. Failures can be
//! queued per operation to exercise error paths.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::{ApiError, WorkPackageApi};
use crate::attachments::Attachment;
use crate::changeset::RequestPayload;
use crate::lock;
use crate::model::{Schema, Snapshot, WorkPackageId};

/// API operations that failures can be queued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    FetchSchema,
    Update,
    LoadUpdatedSince,
    DeleteAttachment,
}

#[derive(Default)]
struct MemoryState {
    work_packages: BTreeMap<WorkPackageId, Snapshot>,
    schemas: HashMap<String, Schema>,
    attachments: HashSet<String>,
    next_id: u64,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    calls: HashMap<Operation, usize>,
}

#[derive(Default)]
pub struct InMemoryApi {
    state: Mutex<MemoryState>,
}

impl InMemoryApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a work package as the server's current representation.
    pub fn insert(&self, snapshot: Snapshot) {
        let mut state = lock(&self.state);
        if let Ok(numeric) = snapshot.id.as_str().parse::<u64>() {
            state.next_id = state.next_id.max(numeric);
        }
        state.work_packages.insert(snapshot.id.clone(), snapshot);
    }

    pub fn insert_schema(&self, schema: Schema) {
        lock(&self.state)
            .schemas
            .insert(schema.type_href.clone(), schema);
    }

    pub fn insert_attachment(&self, attachment: &Attachment) {
        lock(&self.state)
            .attachments
            .insert(attachment.id.clone());
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        lock(&self.state)
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Server-side representation, bypassing call accounting.
    #[must_use]
    pub fn stored(&self, id: &WorkPackageId) -> Option<Snapshot> {
        lock(&self.state).work_packages.get(id).cloned()
    }

    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        lock(&self.state)
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    fn begin(&self, operation: Operation) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        *state.calls.entry(operation).or_default() += 1;
        match state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Cleared attributes are stored as explicit `Null` so that responses
/// still list them.
fn apply_payload(target: &mut Snapshot, payload: &RequestPayload) {
    for (attribute, value) in payload.iter() {
        target.attributes.insert(attribute.clone(), value.clone());
    }
}

fn touch(snapshot: &mut Snapshot, now: DateTime<Utc>) {
    snapshot.lock_version += 1;
    snapshot.updated_at = Some(now);
}

#[async_trait]
impl WorkPackageApi for InMemoryApi {
    async fn fetch(&self, id: &WorkPackageId) -> Result<Snapshot, ApiError> {
        self.begin(Operation::Fetch)?;
        lock(&self.state)
            .work_packages
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                what: "work package",
                id: id.to_string(),
            })
    }

    async fn fetch_schema(&self, type_href: &str) -> Result<Schema, ApiError> {
        self.begin(Operation::FetchSchema)?;
        lock(&self.state)
            .schemas
            .get(type_href)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                what: "schema",
                id: type_href.to_string(),
            })
    }

    async fn update_immediately(
        &self,
        pristine: &Snapshot,
        payload: &RequestPayload,
    ) -> Result<Snapshot, ApiError> {
        self.begin(Operation::Update)?;
        let now = Utc::now();
        let mut state = lock(&self.state);

        let saved = if pristine.is_new() {
            state.next_id += 1;
            let mut created = Snapshot {
                id: WorkPackageId::new(state.next_id.to_string()),
                lock_version: 0,
                updated_at: Some(now),
                ..pristine.clone()
            };
            apply_payload(&mut created, payload);
            debug!(id = %created.id, "created work package");
            created
        } else {
            let current = state
                .work_packages
                .get(&pristine.id)
                .ok_or_else(|| ApiError::NotFound {
                    what: "work package",
                    id: pristine.id.to_string(),
                })?;
            if current.lock_version != payload.lock_version {
                return Err(ApiError::Conflict {
                    id: pristine.id.clone(),
                    sent: payload.lock_version,
                    current: current.lock_version,
                });
            }
            let mut updated = current.clone();
            apply_payload(&mut updated, payload);
            touch(&mut updated, now);
            updated
        };

        if let Some(parent) = saved.parent_id() {
            if let Some(parent) = state.work_packages.get_mut(&parent) {
                touch(parent, now);
            }
        }
        state
            .work_packages
            .insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    async fn load_ids_updated_since(
        &self,
        ids: &[WorkPackageId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>, ApiError> {
        self.begin(Operation::LoadUpdatedSince)?;
        let state = lock(&self.state);
        Ok(ids
            .iter()
            .filter_map(|id| state.work_packages.get(id))
            .filter(|wp| wp.updated_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }

    async fn delete_attachment(&self, attachment: &Attachment) -> Result<(), ApiError> {
        self.begin(Operation::DeleteAttachment)?;
        if lock(&self.state).attachments.remove(&attachment.id) {
            Ok(())
        } else {
            Err(ApiError::NotFound {
                what: "attachment",
                id: attachment.id.clone(),
            })
        }
    }
}
