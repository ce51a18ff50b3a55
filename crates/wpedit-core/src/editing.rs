//! The editing service: one change-set per work package, and the save path.
//!
//! # Save lifecycle
//!
//! 1. The change-set is marked in flight; a second save while one is in
//!    flight is rejected with [`EditError::SaveInFlight`].
//! 2. The schema for the work package type is ensured and the request
//!    payload is built. Validation failures return
//!    [`EditError::Validation`] before anything is submitted.
//! 3. The payload is submitted via `updateImmediately`. Transport and server
//!    errors are returned unmodified; the edits stay in the change-set.
//! 4. On success the saved snapshot replaces the cached one, a
//!    [`CommitRecord`] is published to the commit subscribers, the
//!    change-set is cleared and detached, and the post-commit hooks run.
//!
//! A save that resolves after the caller stopped editing is still applied
//! to the cache and published.
//!
//! # Edit resource views
//!
//! [`EditResourceView`] subscribers are pushed the merged value whenever the
//! cached snapshot is replaced, whenever the modifications of the registered
//! change-set change, and when a non-empty change-set is cleared or
//! detached. Swapping one empty change-set for another pushes nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::api::{ApiError, WorkPackageApi};
use crate::cache::{ResourceCache, SchemaCache, SubscriptionId};
use crate::changeset::{Changeset, ChangesetRef};
use crate::error::EditError;
use crate::hooks::{CommitContext, PostCommitHook};
use crate::lock;
use crate::model::{AttrValue, Form, Schema, Snapshot, WorkPackageId};

/// Callback invoked with every commit record.
pub type CommitCallback = Arc<dyn Fn(&CommitRecord) + Send + Sync>;

/// Callback pushed the merged value of an edit resource view.
pub type ViewCallback = Arc<dyn Fn(Option<Arc<Snapshot>>) + Send + Sync>;

type Registry = Arc<Mutex<HashMap<WorkPackageId, ChangesetRef>>>;

// ---------------------------------------------------------------------------
// CommitRecord
// ---------------------------------------------------------------------------

/// The saved change of a work package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    /// Id of the saved work package (the newly assigned id when `was_new`).
    pub id: WorkPackageId,
    /// Whether the commit created the work package.
    pub was_new: bool,
    /// The resulting, saved work package.
    pub work_package: Arc<Snapshot>,
    /// The exact modifications that were submitted.
    pub changes: BTreeMap<String, AttrValue>,
}

// ---------------------------------------------------------------------------
// EditingService
// ---------------------------------------------------------------------------

pub struct EditingService {
    api: Arc<dyn WorkPackageApi>,
    cache: Arc<ResourceCache>,
    schemas: Arc<SchemaCache>,
    changesets: Registry,
    views: Arc<ViewHub>,
    commit_subscribers: Mutex<Vec<(SubscriptionId, CommitCallback)>>,
    next_subscription: Mutex<u64>,
    hooks: Vec<Box<dyn PostCommitHook>>,
}

impl EditingService {
    #[must_use]
    pub fn new(
        api: Arc<dyn WorkPackageApi>,
        cache: Arc<ResourceCache>,
        schemas: Arc<SchemaCache>,
    ) -> Self {
        let changesets: Registry = Arc::new(Mutex::new(HashMap::new()));
        let views = Arc::new(ViewHub {
            cache: Arc::clone(&cache),
            changesets: Arc::clone(&changesets),
            subscribers: Mutex::new(ViewSubscribers::default()),
        });
        Self {
            api,
            cache,
            schemas,
            changesets,
            views,
            commit_subscribers: Mutex::new(Vec::new()),
            next_subscription: Mutex::new(0),
            hooks: Vec::new(),
        }
    }

    /// Append a post-commit hook; hooks run in registration order.
    #[must_use]
    pub fn with_hook(mut self, hook: Box<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<Box<dyn PostCommitHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    #[must_use]
    pub fn api(&self) -> &Arc<dyn WorkPackageApi> {
        &self.api
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    #[must_use]
    pub const fn schemas(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    /// Cached schema for the snapshot's type, without fetching.
    #[must_use]
    pub fn schema_for(&self, snapshot: &Snapshot) -> Option<Arc<Schema>> {
        self.schemas.get(&snapshot.type_href)
    }

    /// The cached work package, fetched and cached when missing.
    pub async fn load(&self, id: &WorkPackageId) -> Result<Arc<Snapshot>, ApiError> {
        self.cache.require(self.api.as_ref(), id).await
    }

    /// Change-set for a work package loaded by id.
    pub async fn change_for_id(&self, id: &WorkPackageId) -> Result<ChangesetRef, ApiError> {
        let snapshot = self.load(id).await?;
        self.schemas
            .ensure_loaded(self.api.as_ref(), &snapshot.type_href)
            .await?;
        Ok(self.change_for(&snapshot, None))
    }

    /// Start or continue editing a work package.
    ///
    /// Returns the registered change-set for the id. A new one is built from
    /// the newest snapshot available (cache or `fallback`) when none exists,
    /// or when the existing one is empty and older than that snapshot.
    pub fn change_for(&self, fallback: &Arc<Snapshot>, form: Option<Form>) -> ChangesetRef {
        let latest = match self.cache.get(&fallback.id) {
            Some(cached) if cached.lock_version >= fallback.lock_version => cached,
            _ => Arc::clone(fallback),
        };

        let mut registry = lock(&self.changesets);
        if let Some(existing) = registry.get(&latest.id) {
            let stale = {
                let current = existing.lock();
                current.is_empty() && current.pristine().lock_version < latest.lock_version
            };
            if !stale {
                return existing.clone();
            }
            debug!(id = %latest.id, lock_version = latest.lock_version, "rebuilding stale empty change-set");
        }

        debug!(id = %latest.id, "starting change-set");
        let changeset = ChangesetRef::new(Changeset::new(latest, form));
        let views = Arc::downgrade(&self.views);
        changeset.set_listener(Arc::new(move |id: &WorkPackageId| {
            if let Some(views) = views.upgrade() {
                views.publish(id);
            }
        }));
        registry.insert(changeset.work_package_id(), changeset.clone());
        changeset
    }

    /// Registered change-set for `id`, if any.
    #[must_use]
    pub fn existing_change(&self, id: &WorkPackageId) -> Option<ChangesetRef> {
        lock(&self.changesets).get(id).cloned()
    }

    /// Save the change-set. See the module docs for the lifecycle.
    pub async fn save(&self, changeset: &ChangesetRef) -> Result<CommitRecord, EditError> {
        let pristine = {
            let mut current = changeset.lock();
            if current.in_flight() {
                return Err(EditError::SaveInFlight {
                    id: current.work_package_id().clone(),
                });
            }
            current.set_in_flight(true);
            Arc::clone(current.pristine())
        };

        let schema = match self
            .schemas
            .ensure_loaded(self.api.as_ref(), &pristine.type_href)
            .await
        {
            Ok(schema) => schema,
            Err(err) => {
                changeset.lock().set_in_flight(false);
                return Err(err.into());
            }
        };

        let built = {
            let current = changeset.lock();
            current
                .build_request_payload(&schema)
                .map(|payload| (payload, current.changes().clone()))
        };
        let (payload, changes) = match built {
            Ok(built) => built,
            Err(errors) => {
                changeset.lock().set_in_flight(false);
                debug!(id = %pristine.id, %errors, "change-set failed validation");
                return Err(EditError::Validation(errors));
            }
        };

        debug!(id = %pristine.id, attributes = payload.len(), "submitting change-set");
        let mut saved = match self.api.update_immediately(&pristine, &payload).await {
            Ok(saved) => saved,
            Err(err) => {
                changeset.lock().set_in_flight(false);
                warn!(id = %pristine.id, code = %err.code(), %err, "save failed");
                return Err(err.into());
            }
        };
        saved.retain_from(&pristine);

        let saved = self.cache.put(saved);
        let commit = CommitRecord {
            id: saved.id.clone(),
            was_new: pristine.is_new(),
            work_package: saved,
            changes,
        };
        info!(
            id = %commit.id,
            was_new = commit.was_new,
            lock_version = commit.work_package.lock_version,
            "change-set committed"
        );

        self.publish(&commit);
        changeset.lock().set_in_flight(false);
        self.reset(changeset);
        self.run_hooks(&commit).await;

        Ok(commit)
    }

    /// Drop local edits and detach the change-set from the registry.
    pub fn reset(&self, changeset: &ChangesetRef) {
        let (id, had_edits) = {
            let mut current = changeset.lock();
            let had_edits = !current.is_empty();
            current.clear();
            (current.work_package_id().clone(), had_edits)
        };
        let registered = {
            let mut registry = lock(&self.changesets);
            let registered = registry.get(&id).is_some_and(|c| c.ptr_eq(changeset));
            if registered {
                registry.remove(&id);
                debug!(%id, "change-set detached");
            }
            registered
        };
        if registered && had_edits {
            self.views.publish(&id);
        }
    }

    /// Force-clear any change-set for `id`, whatever its state.
    ///
    /// A save already in flight keeps its flag; it still resolves against
    /// the cache.
    pub fn stop_editing(&self, id: &WorkPackageId) {
        let removed = lock(&self.changesets).remove(id);
        if let Some(changeset) = removed {
            let had_edits = {
                let mut current = changeset.lock();
                let had_edits = !current.is_empty();
                current.clear();
                had_edits
            };
            debug!(%id, "editing stopped");
            if had_edits {
                self.views.publish(id);
            }
        }
    }

    /// Live read-only view: projected resource while edits exist, else the
    /// cached snapshot.
    #[must_use]
    pub fn temporary_edit_resource(&self, id: &WorkPackageId) -> EditResourceView {
        EditResourceView {
            id: id.clone(),
            views: Arc::clone(&self.views),
        }
    }

    pub fn subscribe_commits(
        &self,
        callback: impl Fn(&CommitRecord) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let subscription = {
            let mut next = lock(&self.next_subscription);
            *next += 1;
            SubscriptionId::new(*next)
        };
        lock(&self.commit_subscribers).push((subscription, Arc::new(callback)));
        subscription
    }

    pub fn unsubscribe_commits(&self, subscription: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.commit_subscribers);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != subscription);
        subscribers.len() != before
    }

    fn publish(&self, commit: &CommitRecord) {
        let callbacks: Vec<CommitCallback> = lock(&self.commit_subscribers)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(commit);
        }
    }

    async fn run_hooks(&self, commit: &CommitRecord) {
        let ctx = CommitContext {
            commit,
            api: self.api.as_ref(),
            cache: &self.cache,
        };
        for hook in &self.hooks {
            if let Err(err) = hook.after_commit(&ctx).await {
                warn!(hook = hook.name(), id = %commit.id, error = %format!("{err:#}"), "post-commit hook failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EditResourceView
// ---------------------------------------------------------------------------

/// Read-only merged view of a work package being edited.
pub struct EditResourceView {
    id: WorkPackageId,
    views: Arc<ViewHub>,
}

impl EditResourceView {
    #[must_use]
    pub const fn id(&self) -> &WorkPackageId {
        &self.id
    }

    /// Current value of the view.
    #[must_use]
    pub fn value(&self) -> Option<Arc<Snapshot>> {
        self.views.merged(&self.id)
    }

    /// Current value, or `fallback` when nothing is cached or edited.
    #[must_use]
    pub fn value_or(&self, fallback: &Arc<Snapshot>) -> Arc<Snapshot> {
        self.value().unwrap_or_else(|| Arc::clone(fallback))
    }

    /// Push the recomputed view to `callback` whenever the cached snapshot
    /// or the edits for this id change.
    pub fn subscribe(
        &self,
        callback: impl Fn(Option<Arc<Snapshot>>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.views.subscribe(&self.id, Arc::new(callback))
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.views.unsubscribe(&self.id, subscription)
    }
}

#[derive(Default)]
struct ViewSubscribers {
    callbacks: HashMap<WorkPackageId, Vec<(SubscriptionId, ViewCallback)>>,
    /// One cache subscription per id with at least one view subscriber.
    cache_links: HashMap<WorkPackageId, SubscriptionId>,
    next_subscription: u64,
}

/// Fans change-set and cache updates out to view subscribers.
///
/// The subscriber lock is never held while the registry or a change-set is
/// locked, and callbacks run with no lock held.
struct ViewHub {
    cache: Arc<ResourceCache>,
    changesets: Registry,
    subscribers: Mutex<ViewSubscribers>,
}

impl ViewHub {
    fn merged(&self, id: &WorkPackageId) -> Option<Arc<Snapshot>> {
        let changeset = lock(&self.changesets).get(id).cloned();
        if let Some(changeset) = changeset {
            let current = changeset.lock();
            if !current.is_empty() {
                return Some(Arc::new(current.projected_snapshot()));
            }
        }
        self.cache.get(id)
    }

    fn publish(&self, id: &WorkPackageId) {
        let callbacks: Vec<ViewCallback> = lock(&self.subscribers)
            .callbacks
            .get(id)
            .map_or_else(Vec::new, |list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect());
        if callbacks.is_empty() {
            return;
        }
        let value = self.merged(id);
        trace!(%id, subscribers = callbacks.len(), "pushing edit resource view");
        for callback in callbacks {
            callback(value.clone());
        }
    }

    fn subscribe(self: &Arc<Self>, id: &WorkPackageId, callback: ViewCallback) -> SubscriptionId {
        let mut subscribers = lock(&self.subscribers);
        subscribers.next_subscription += 1;
        let subscription = SubscriptionId::new(subscribers.next_subscription);
        if !subscribers.cache_links.contains_key(id) {
            let hub: Weak<Self> = Arc::downgrade(self);
            let key = id.clone();
            let link = self.cache.subscribe(id, move |_| {
                if let Some(hub) = hub.upgrade() {
                    hub.publish(&key);
                }
            });
            subscribers.cache_links.insert(id.clone(), link);
        }
        subscribers
            .callbacks
            .entry(id.clone())
            .or_default()
            .push((subscription, callback));
        subscription
    }

    fn unsubscribe(&self, id: &WorkPackageId, subscription: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let Some(list) = subscribers.callbacks.get_mut(id) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != subscription);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.callbacks.remove(id);
            if let Some(link) = subscribers.cache_links.remove(id) {
                self.cache.unsubscribe(id, link);
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryApi;
    use crate::model::{FieldKind, FieldSchema, SUBJECT};

    const TYPE: &str = "/api/v3/types/1";

    fn service() -> (Arc<InMemoryApi>, EditingService) {
        let api = Arc::new(InMemoryApi::new());
        api.insert_schema(
            Schema::new(TYPE).field(SUBJECT, FieldSchema::required(FieldKind::Text)),
        );
        let service = EditingService::new(
            api.clone(),
            Arc::new(ResourceCache::new()),
            Arc::new(SchemaCache::new()),
        );
        (api, service)
    }

    fn wp(id: &str, version: u64) -> Arc<Snapshot> {
        Arc::new(
            Snapshot::new(id, TYPE)
                .with_lock_version(version)
                .with(SUBJECT, AttrValue::text("Subject")),
        )
    }

    #[test]
    fn change_for_prefers_newer_cached_snapshot() {
        let (_api, service) = service();
        service.cache().put(Snapshot::clone(&wp("1", 5)));

        let cs = service.change_for(&wp("1", 2), None);
        assert_eq!(cs.lock().pristine().lock_version, 5);
    }

    #[test]
    fn change_for_uses_fallback_when_cache_is_older() {
        let (_api, service) = service();
        service.cache().put(Snapshot::clone(&wp("1", 1)));

        let cs = service.change_for(&wp("1", 3), None);
        assert_eq!(cs.lock().pristine().lock_version, 3);
    }

    #[test]
    fn non_empty_changeset_survives_newer_snapshot() {
        let (_api, service) = service();
        let cs = service.change_for(&wp("1", 1), None);
        cs.set_value(SUBJECT, AttrValue::text("edited"));
        service.cache().put(Snapshot::clone(&wp("1", 2)));

        let again = service.change_for(&wp("1", 1), None);
        assert!(again.ptr_eq(&cs));
        assert_eq!(again.lock().pristine().lock_version, 1);
    }

    #[test]
    fn reset_only_detaches_the_registered_instance() {
        let (_api, service) = service();
        let id = WorkPackageId::new("1");
        let stale = service.change_for(&wp("1", 1), None);
        service.cache().put(Snapshot::clone(&wp("1", 2)));
        let fresh = service.change_for(&wp("1", 1), None);
        assert!(!fresh.ptr_eq(&stale));

        service.reset(&stale);
        assert!(service.existing_change(&id).is_some_and(|c| c.ptr_eq(&fresh)));

        service.reset(&fresh);
        assert!(service.existing_change(&id).is_none());
    }

    #[test]
    fn stop_editing_force_clears() {
        let (_api, service) = service();
        let cs = service.change_for(&wp("1", 1), None);
        cs.set_value(SUBJECT, AttrValue::text("edited"));

        service.stop_editing(&WorkPackageId::new("1"));
        assert!(cs.is_empty());
        assert!(service.existing_change(&WorkPackageId::new("1")).is_none());
    }

    #[test]
    fn temporary_view_switches_between_projection_and_cache() {
        let (_api, service) = service();
        let id = WorkPackageId::new("1");
        let view = service.temporary_edit_resource(&id);
        assert!(view.value().is_none());

        service.cache().put(Snapshot::clone(&wp("1", 1)));
        let cs = service.change_for(&wp("1", 1), None);
        assert_eq!(view.value().and_then(|s| s.subject().map(str::to_string)).as_deref(), Some("Subject"));

        cs.set_value(SUBJECT, AttrValue::text("Draft"));
        assert_eq!(view.value().and_then(|s| s.subject().map(str::to_string)).as_deref(), Some("Draft"));
    }

    #[tokio::test]
    async fn save_while_in_flight_is_rejected() {
        let (_api, service) = service();
        let cs = service.change_for(&wp("1", 1), None);
        cs.lock().set_in_flight(true);

        let err = service.save(&cs).await.expect_err("must reject");
        assert!(matches!(err, EditError::SaveInFlight { .. }));
        assert!(cs.in_flight());
    }

    #[tokio::test]
    async fn stop_editing_keeps_pending_save_guard() {
        let (_api, service) = service();
        let cs = service.change_for(&wp("1", 1), None);
        cs.set_value(SUBJECT, AttrValue::text("edited"));
        cs.lock().set_in_flight(true);

        service.stop_editing(&WorkPackageId::new("1"));
        assert!(cs.is_empty());
        assert!(cs.in_flight());

        let err = service.save(&cs).await.expect_err("must reject");
        assert!(matches!(err, EditError::SaveInFlight { .. }));
    }

    #[tokio::test]
    async fn successful_save_lowers_in_flight() {
        let (api, service) = service();
        api.insert(Snapshot::clone(&wp("1", 1)));
        let cs = service.change_for(&wp("1", 1), None);
        cs.set_value(SUBJECT, AttrValue::text("edited"));

        service.save(&cs).await.expect("save");
        assert!(!cs.in_flight());
        assert!(cs.is_empty());
    }

    #[test]
    fn stale_rebuild_of_empty_changeset_pushes_nothing() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_api, service) = service();
        let id = WorkPackageId::new("1");
        service.cache().put(Snapshot::clone(&wp("1", 1)));
        let first = service.change_for(&wp("1", 1), None);

        let view = service.temporary_edit_resource(&id);
        let pushes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pushes);
        view.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.cache().put(Snapshot::clone(&wp("1", 2)));
        assert_eq!(pushes.load(Ordering::SeqCst), 1);

        let rebuilt = service.change_for(&wp("1", 1), None);
        assert!(!rebuilt.ptr_eq(&first));
        assert_eq!(pushes.load(Ordering::SeqCst), 1);

        rebuilt.set_value(SUBJECT, AttrValue::text("edited"));
        assert_eq!(pushes.load(Ordering::SeqCst), 2);
    }
}
