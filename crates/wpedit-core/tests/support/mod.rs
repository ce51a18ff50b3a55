//! Shared fixtures for the wpedit-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use wpedit_core::cache::{ActivityCache, ResourceCache, SchemaCache};
use wpedit_core::config::HooksConfig;
use wpedit_core::events::EventBus;
use wpedit_core::hooks::default_hooks;
use wpedit_core::model::{
    AttrValue, DUE_DATE, FieldKind, FieldSchema, PARENT, START_DATE, STATUS, SUBJECT, Schema,
    Snapshot,
};
use wpedit_core::notify::RecordingNotifier;
use wpedit_core::{EditingService, InMemoryApi};

pub const TASK: &str = "/api/v3/types/1";
pub const BUG: &str = "/api/v3/types/2";

pub fn schema(type_href: &str) -> Schema {
    Schema::new(type_href)
        .field(SUBJECT, FieldSchema::required(FieldKind::Text))
        .field(STATUS, FieldSchema::writable(FieldKind::Link))
        .field("type", FieldSchema::writable(FieldKind::Link))
        .field("assignee", FieldSchema::writable(FieldKind::Link))
        .field("priority", FieldSchema::writable(FieldKind::Int))
        .field(PARENT, FieldSchema::writable(FieldKind::Link))
        .field(START_DATE, FieldSchema::writable(FieldKind::Date))
        .field(DUE_DATE, FieldSchema::writable(FieldKind::Date))
        .field("createdAt", FieldSchema::read_only(FieldKind::Date))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn work_package(id: &str, subject: &str) -> Snapshot {
    Snapshot::new(id, TASK)
        .with(SUBJECT, AttrValue::text(subject))
        .with("type", AttrValue::link(TASK))
}

pub struct Harness {
    pub api: Arc<InMemoryApi>,
    pub service: EditingService,
    pub notifier: RecordingNotifier,
    pub bus: EventBus,
    pub activity: Arc<ActivityCache>,
}

impl Harness {
    /// Editing service without post-commit hooks.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Editing service with every default hook enabled.
    pub fn with_default_hooks() -> Self {
        Self::build(Some(HooksConfig::default()))
    }

    fn build(hooks: Option<HooksConfig>) -> Self {
        let api = Arc::new(InMemoryApi::new());
        api.insert_schema(schema(TASK));
        api.insert_schema(schema(BUG));

        let bus = EventBus::default();
        let activity = Arc::new(ActivityCache::new());
        let mut service = EditingService::new(
            api.clone(),
            Arc::new(ResourceCache::new()),
            Arc::new(SchemaCache::new()),
        );
        if let Some(config) = hooks {
            service = service.with_hooks(default_hooks(&config, &activity, &bus));
        }

        Self {
            api,
            service,
            notifier: RecordingNotifier::new(),
            bus,
            activity,
        }
    }

    /// Seed the server and the cache with `snapshot`.
    pub fn seed(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        self.api.insert(snapshot.clone());
        self.service.cache().put(snapshot)
    }
}
