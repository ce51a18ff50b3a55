//! Shared in-memory stores: work package snapshots, schemas and activity logs.
//!
//! The [`ResourceCache`] holds the last-known-good server representation of
//! each work package. Entries are replaced wholesale and every replacement or
//! invalidation is pushed to the subscribers registered for that id.
//! Callbacks run after the internal lock is released, so a subscriber may
//! read the cache again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::api::{ApiError, WorkPackageApi};
use crate::lock;
use crate::model::{Schema, Snapshot, WorkPackageId};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Callback pushed the new cache value for a key (`None` after invalidation).
pub type SnapshotCallback = Arc<dyn Fn(Option<Arc<Snapshot>>) + Send + Sync>;

// ---------------------------------------------------------------------------
// ResourceCache
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CacheState {
    entries: HashMap<WorkPackageId, Arc<Snapshot>>,
    subscribers: HashMap<WorkPackageId, Vec<(SubscriptionId, SnapshotCallback)>>,
    next_subscription: u64,
}

#[derive(Default)]
pub struct ResourceCache {
    state: Mutex<CacheState>,
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &WorkPackageId) -> Option<Arc<Snapshot>> {
        lock(&self.state).entries.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &WorkPackageId) -> bool {
        lock(&self.state).entries.contains_key(id)
    }

    /// Replace the cached snapshot for `snapshot.id` and notify its subscribers.
    pub fn put(&self, snapshot: impl Into<Arc<Snapshot>>) -> Arc<Snapshot> {
        let snapshot = snapshot.into();
        let callbacks = {
            let mut state = lock(&self.state);
            state
                .entries
                .insert(snapshot.id.clone(), Arc::clone(&snapshot));
            Self::callbacks_for(&state, &snapshot.id)
        };
        trace!(id = %snapshot.id, lock_version = snapshot.lock_version, "cache put");
        for callback in callbacks {
            callback(Some(Arc::clone(&snapshot)));
        }
        snapshot
    }

    pub fn put_all(&self, snapshots: impl IntoIterator<Item = Snapshot>) {
        for snapshot in snapshots {
            self.put(snapshot);
        }
    }

    /// Drop the cached entry, notifying subscribers with `None`.
    pub fn invalidate(&self, id: &WorkPackageId) -> Option<Arc<Snapshot>> {
        let (removed, callbacks) = {
            let mut state = lock(&self.state);
            let removed = state.entries.remove(id);
            (removed, Self::callbacks_for(&state, id))
        };
        if removed.is_some() {
            debug!(%id, "cache entry invalidated");
            for callback in callbacks {
                callback(None);
            }
        }
        removed
    }

    /// The cached snapshot, or fetch it and cache the result.
    pub async fn require(
        &self,
        api: &dyn WorkPackageApi,
        id: &WorkPackageId,
    ) -> Result<Arc<Snapshot>, ApiError> {
        if let Some(cached) = self.get(id) {
            return Ok(cached);
        }
        let fetched = api.fetch(id).await?;
        Ok(self.put(fetched))
    }

    pub fn subscribe(
        &self,
        id: &WorkPackageId,
        callback: impl Fn(Option<Arc<Snapshot>>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut state = lock(&self.state);
        state.next_subscription += 1;
        let subscription = SubscriptionId(state.next_subscription);
        state
            .subscribers
            .entry(id.clone())
            .or_default()
            .push((subscription, Arc::new(callback)));
        subscription
    }

    pub fn unsubscribe(&self, id: &WorkPackageId, subscription: SubscriptionId) -> bool {
        let mut state = lock(&self.state);
        let Some(list) = state.subscribers.get_mut(id) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != subscription);
        let removed = list.len() != before;
        if list.is_empty() {
            state.subscribers.remove(id);
        }
        removed
    }

    fn callbacks_for(state: &CacheState, id: &WorkPackageId) -> Vec<SnapshotCallback> {
        state
            .subscribers
            .get(id)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// SchemaCache
// ---------------------------------------------------------------------------

/// Schemas keyed by type href; each type is fetched at most once.
#[derive(Default)]
pub struct SchemaCache {
    schemas: Mutex<HashMap<String, Arc<Schema>>>,
}

impl SchemaCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, type_href: &str) -> Option<Arc<Schema>> {
        lock(&self.schemas).get(type_href).cloned()
    }

    pub fn insert(&self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        lock(&self.schemas).insert(schema.type_href.clone(), Arc::clone(&schema));
        schema
    }

    pub async fn ensure_loaded(
        &self,
        api: &dyn WorkPackageApi,
        type_href: &str,
    ) -> Result<Arc<Schema>, ApiError> {
        if let Some(schema) = self.get(type_href) {
            return Ok(schema);
        }
        debug!(type_href, "fetching schema");
        let schema = api.fetch_schema(type_href).await?;
        Ok(self.insert(schema))
    }
}

// ---------------------------------------------------------------------------
// ActivityCache
// ---------------------------------------------------------------------------

/// Cached activity log (journal notes) per work package.
#[derive(Default)]
pub struct ActivityCache {
    entries: Mutex<HashMap<WorkPackageId, Vec<String>>>,
}

impl ActivityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: WorkPackageId, activities: Vec<String>) {
        lock(&self.entries).insert(id, activities);
    }

    #[must_use]
    pub fn get(&self, id: &WorkPackageId) -> Option<Vec<String>> {
        lock(&self.entries).get(id).cloned()
    }

    pub fn invalidate(&self, id: &WorkPackageId) -> bool {
        lock(&self.entries).remove(id).is_some()
    }
}
