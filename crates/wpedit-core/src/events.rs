//! Domain event bus for parts of the application unrelated to editing.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::WorkPackageId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Created { id: WorkPackageId },
    Updated { id: WorkPackageId },
    Renamed { id: WorkPackageId, subject: String },
}

impl DomainEvent {
    #[must_use]
    pub const fn id(&self) -> &WorkPackageId {
        match self {
            Self::Created { id } | Self::Updated { id } | Self::Renamed { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current receivers. Returns how many received it;
    /// publishing with nobody listening is not an error.
    pub fn publish(&self, event: DomainEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!(?event, "no receivers for domain event");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
