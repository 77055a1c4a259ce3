//! Reconciliation Cache: read-through snapshots of each collection.
//!
//! Every successful mutation invalidates the affected collection; the next
//! read refetches from the store. [`CollectionCache::settle`] is the bounded
//! replacement for "sleep and hope the refetch reflects my write".

use crate::bus::{CurriculumEvent, EventBus};
use crate::config::SettlePolicy;
use crate::error::StoreResult;
use crate::model::{Component, Container, Entity, EntityKind, Pathway, Series, Unit};
use crate::store::{EntityStore, SortKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug)]
struct Snapshot<E> {
    records: Arc<Vec<E>>,
    epoch: u64,
}

/// Result of [`CollectionCache::settle`].
#[derive(Debug, Clone)]
pub struct Settled<E> {
    pub records: Arc<Vec<E>>,
    pub attempts: u32,
    /// `false` when attempts ran out before the predicate held.
    pub converged: bool,
}

#[derive(Debug)]
pub struct CollectionCache<E: Entity> {
    snapshot: RwLock<Option<Snapshot<E>>>,
    epoch: AtomicU64,
    generation: AtomicU64,
    fetch: Mutex<()>,
    sort: SortKey,
    bus: EventBus,
}

impl<E: Entity> CollectionCache<E> {
    pub fn new(bus: EventBus) -> Self {
        Self {
            snapshot: RwLock::new(None),
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            fetch: Mutex::new(()),
            sort: SortKey::sequence_order(),
            bus,
        }
    }

    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    /// Number of completed fetches.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether the next [`read`](Self::read) will be served without a fetch.
    pub fn is_fresh(&self) -> bool {
        self.valid_snapshot().is_some()
    }

    fn valid_snapshot(&self) -> Option<Arc<Vec<E>>> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|snapshot| snapshot.epoch == epoch)
            .map(|snapshot| Arc::clone(&snapshot.records))
    }

    /// Drops the current snapshot; the next read refetches.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        debug!(kind = ?E::KIND, "cache invalidated");
    }

    /// Cached records, fetching them when the snapshot is missing or stale.
    pub async fn read<S>(&self, store: &S) -> StoreResult<Arc<Vec<E>>>
    where
        S: EntityStore<E> + ?Sized,
    {
        if let Some(records) = self.valid_snapshot() {
            return Ok(records);
        }
        let _single_flight = self.fetch.lock().await;
        if let Some(records) = self.valid_snapshot() {
            return Ok(records);
        }
        self.fetch_locked(store).await
    }

    /// Unconditional refetch.
    pub async fn refresh<S>(&self, store: &S) -> StoreResult<Arc<Vec<E>>>
    where
        S: EntityStore<E> + ?Sized,
    {
        let _single_flight = self.fetch.lock().await;
        self.fetch_locked(store).await
    }

    async fn fetch_locked<S>(&self, store: &S) -> StoreResult<Arc<Vec<E>>>
    where
        S: EntityStore<E> + ?Sized,
    {
        // An invalidation racing with this fetch bumps the epoch past the one
        // recorded here, so the next read refetches.
        let epoch = self.epoch.load(Ordering::Acquire);
        let records = Arc::new(store.list(Some(&self.sort)).await?);
        {
            let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Some(Snapshot {
                records: Arc::clone(&records),
                epoch,
            });
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(kind = ?E::KIND, generation, records = records.len(), "cache refreshed");
        self.bus.emit(CurriculumEvent::CacheRefreshed {
            kind: E::KIND,
            generation,
        });
        Ok(records)
    }

    /// Invalidates and refetches until `predicate` accepts the records or
    /// `policy.max_attempts` reads have been made.
    pub async fn settle<S, P>(
        &self,
        store: &S,
        policy: SettlePolicy,
        predicate: P,
    ) -> StoreResult<Settled<E>>
    where
        S: EntityStore<E> + ?Sized,
        P: Fn(&[E]) -> bool + Send,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.invalidate();
            let records = self.refresh(store).await?;
            if predicate(&records) {
                return Ok(Settled {
                    records,
                    attempts,
                    converged: true,
                });
            }
            if attempts >= max_attempts {
                warn!(kind = ?E::KIND, attempts, "store did not reflect the write within the settle policy");
                return Ok(Settled {
                    records,
                    attempts,
                    converged: false,
                });
            }
            tokio::time::sleep(policy.interval).await;
        }
    }
}

/// Maps a record type to its collection inside [`ReconciliationCache`].
pub trait Cached: Entity {
    fn collection(cache: &ReconciliationCache) -> &CollectionCache<Self>;
}

/// One [`CollectionCache`] per entity kind.
#[derive(Debug)]
pub struct ReconciliationCache {
    containers: CollectionCache<Container>,
    pathways: CollectionCache<Pathway>,
    series: CollectionCache<Series>,
    units: CollectionCache<Unit>,
    components: CollectionCache<Component>,
}

impl ReconciliationCache {
    pub fn new(bus: EventBus) -> Self {
        Self {
            containers: CollectionCache::new(bus.clone()),
            pathways: CollectionCache::new(bus.clone()),
            series: CollectionCache::new(bus.clone()),
            units: CollectionCache::new(bus.clone()),
            components: CollectionCache::new(bus),
        }
    }

    pub fn collection<E: Cached>(&self) -> &CollectionCache<E> {
        E::collection(self)
    }

    pub fn invalidate(&self, kind: EntityKind) {
        match kind {
            EntityKind::Container => self.containers.invalidate(),
            EntityKind::Pathway => self.pathways.invalidate(),
            EntityKind::Series => self.series.invalidate(),
            EntityKind::Unit => self.units.invalidate(),
            EntityKind::Component => self.components.invalidate(),
        }
    }

    pub fn invalidate_all(&self) {
        for kind in EntityKind::ALL {
            self.invalidate(kind);
        }
    }
}

impl Cached for Container {
    fn collection(cache: &ReconciliationCache) -> &CollectionCache<Self> {
        &cache.containers
    }
}

impl Cached for Pathway {
    fn collection(cache: &ReconciliationCache) -> &CollectionCache<Self> {
        &cache.pathways
    }
}

impl Cached for Series {
    fn collection(cache: &ReconciliationCache) -> &CollectionCache<Self> {
        &cache.series
    }
}

impl Cached for Unit {
    fn collection(cache: &ReconciliationCache) -> &CollectionCache<Self> {
        &cache.units
    }
}

impl Cached for Component {
    fn collection(cache: &ReconciliationCache) -> &CollectionCache<Self> {
        &cache.components
    }
}
