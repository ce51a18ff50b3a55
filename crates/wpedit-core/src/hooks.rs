//! Post-commit hooks.
//!
//! After a successful save the editing service runs its hooks in
//! registration order. Each hook is independently fallible: a failure is
//! logged and the remaining hooks still run. The save itself has already
//! succeeded by then and is never rolled back.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::api::WorkPackageApi;
use crate::cache::{ActivityCache, ResourceCache};
use crate::config::HooksConfig;
use crate::editing::CommitRecord;
use crate::events::{DomainEvent, EventBus};
use crate::model::SUBJECT;

/// What a hook gets to see and touch after a commit.
pub struct CommitContext<'a> {
    pub commit: &'a CommitRecord,
    pub api: &'a dyn WorkPackageApi,
    pub cache: &'a ResourceCache,
}

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn after_commit(&self, ctx: &CommitContext<'_>) -> Result<()>;
}

/// Drops the cached activity log of the saved work package.
pub struct ActivityInvalidation {
    activity: Arc<ActivityCache>,
}

impl ActivityInvalidation {
    #[must_use]
    pub const fn new(activity: Arc<ActivityCache>) -> Self {
        Self { activity }
    }
}

#[async_trait]
impl PostCommitHook for ActivityInvalidation {
    fn name(&self) -> &'static str {
        "activity-invalidation"
    }

    async fn after_commit(&self, ctx: &CommitContext<'_>) -> Result<()> {
        if self.activity.invalidate(&ctx.commit.id) {
            debug!(id = %ctx.commit.id, "activity log invalidated");
        }
        Ok(())
    }
}

/// Invalidates and refetches the parent so its rolled-up values refresh.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParentRefresh;

#[async_trait]
impl PostCommitHook for ParentRefresh {
    fn name(&self) -> &'static str {
        "parent-refresh"
    }

    async fn after_commit(&self, ctx: &CommitContext<'_>) -> Result<()> {
        let Some(parent) = ctx.commit.work_package.parent_id() else {
            return Ok(());
        };
        ctx.cache.invalidate(&parent);
        let fresh = ctx
            .api
            .fetch(&parent)
            .await
            .with_context(|| format!("refetching parent {parent}"))?;
        debug!(%parent, lock_version = fresh.lock_version, "parent refreshed");
        ctx.cache.put(fresh);
        Ok(())
    }
}

/// Broadcasts created/updated/renamed events for the commit.
pub struct EventPublisher {
    bus: EventBus,
}

impl EventPublisher {
    #[must_use]
    pub const fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl PostCommitHook for EventPublisher {
    fn name(&self) -> &'static str {
        "event-publisher"
    }

    async fn after_commit(&self, ctx: &CommitContext<'_>) -> Result<()> {
        let id = ctx.commit.id.clone();
        if ctx.commit.was_new {
            self.bus.publish(DomainEvent::Created { id: id.clone() });
        } else {
            self.bus.publish(DomainEvent::Updated { id: id.clone() });
        }
        if !ctx.commit.changes.contains_key(SUBJECT) {
            return Ok(());
        }
        if let Some(subject) = ctx.commit.work_package.subject() {
            self.bus.publish(DomainEvent::Renamed {
                id,
                subject: subject.to_string(),
            });
        }
        Ok(())
    }
}

/// The hook list enabled by `config`, in the order they should run.
#[must_use]
pub fn default_hooks(
    config: &HooksConfig,
    activity: &Arc<ActivityCache>,
    bus: &EventBus,
) -> Vec<Box<dyn PostCommitHook>> {
    let mut hooks: Vec<Box<dyn PostCommitHook>> = Vec::new();
    if config.invalidate_activity {
        hooks.push(Box::new(ActivityInvalidation::new(Arc::clone(activity))));
    }
    if config.refresh_parent {
        hooks.push(Box::new(ParentRefresh));
    }
    if config.publish_events {
        hooks.push(Box::new(EventPublisher::new(bus.clone())));
    }
    hooks
}
