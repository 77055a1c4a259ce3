//! Fact broadcasting for views that re-render after engine work.
//!
//! At-most-once, in-memory delivery: a receiver that lags behind the
//! channel capacity misses events and should re-read the cache instead.

use crate::model::EntityKind;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Per-level creation counts of one materialization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreationCounts {
    pub pathways: usize,
    pub series: usize,
    pub units: usize,
    pub components: usize,
}

/// Something that happened; never a request.
#[derive(Debug, Clone, PartialEq)]
pub enum CurriculumEvent {
    StructureMaterialized {
        container_id: Uuid,
        counts: CreationCounts,
        errors: usize,
        cancelled: bool,
    },
    ModulesMaterialized {
        series_id: Uuid,
        counts: CreationCounts,
        errors: usize,
        cancelled: bool,
    },
    ItemPlaced {
        kind: EntityKind,
        item_id: Uuid,
        parent_id: Uuid,
        sequence_order: u32,
    },
    Reconciled {
        kind: EntityKind,
        parent_id: Uuid,
        corrections: usize,
    },
    /// Corrective writes failed; the cache was force-invalidated and views
    /// should treat their current order as possibly stale.
    ReconciliationDegraded {
        kind: EntityKind,
        parent_ids: Vec<Uuid>,
        failed: usize,
    },
    ItemRemoved {
        kind: EntityKind,
        item_id: Uuid,
        parent_id: Uuid,
    },
    CacheRefreshed {
        kind: EntityKind,
        generation: u64,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CurriculumEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(crate::config::EngineConfig::DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes `event`. Having no subscribers is not an error.
    pub fn emit(&self, event: CurriculumEvent) {
        trace!(?event, "emit");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CurriculumEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_emitted_after_subscribing() {
        let bus = EventBus::new();
        bus.emit(CurriculumEvent::CacheRefreshed {
            kind: EntityKind::Unit,
            generation: 1,
        });

        let mut rx = bus.subscribe();
        bus.emit(CurriculumEvent::CacheRefreshed {
            kind: EntityKind::Unit,
            generation: 2,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            CurriculumEvent::CacheRefreshed {
                kind: EntityKind::Unit,
                generation: 2
            }
        );
    }

    #[tokio::test]
    async fn lagged_receivers_miss_events() {
        let bus = EventBus::with_capacity(1);
        let mut rx = bus.subscribe();
        for generation in 0..3 {
            bus.emit(CurriculumEvent::CacheRefreshed {
                kind: EntityKind::Series,
                generation,
            });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
