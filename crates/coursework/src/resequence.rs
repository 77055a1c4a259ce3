//! Resequencing Engine: keeps `sequence_order` dense after moves.
//!
//! Every operation has the same shape:
//!
//! ```text
//! placement write ──► settle (re-read until the write is visible)
//!                          │
//!                          ▼
//!                 plan corrections per affected parent
//!                          │
//!                          ▼
//!          corrective writes, issued together and joined
//! ```
//!
//! The store has no transactions. A failed placement aborts the operation
//! before anything else is written. Failed corrective writes leave the
//! affected parent non-dense; they are reported on the outcome, the whole
//! cache is invalidated and a [`CurriculumEvent::ReconciliationDegraded`] is
//! published so views stop trusting their order.

use crate::bus::{CurriculumEvent, EventBus};
use crate::cache::{Cached, ReconciliationCache};
use crate::cancel::CancelToken;
use crate::config::SettlePolicy;
use crate::error::{ResequenceError, StoreError};
use crate::model::{Draft, EntityKind, Sequenced};
use crate::store::{sibling_order, EntityStore};
use futures::future::join_all;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A drag from one position to another, as reported by the view.
///
/// Indices are 0-based positions in the rendered sibling list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    pub item_id: Uuid,
    pub source_parent_id: Uuid,
    pub source_index: usize,
    pub destination_parent_id: Uuid,
    pub destination_index: usize,
}

impl MoveIntent {
    /// A move between two positions under the same parent.
    pub fn within(parent_id: Uuid, item_id: Uuid, from: usize, to: usize) -> Self {
        Self {
            item_id,
            source_parent_id: parent_id,
            source_index: from,
            destination_parent_id: parent_id,
            destination_index: to,
        }
    }

    pub fn is_cross_parent(&self) -> bool {
        self.source_parent_id != self.destination_parent_id
    }

    /// Dropped where it was picked up.
    pub fn is_noop(&self) -> bool {
        !self.is_cross_parent() && self.source_index == self.destination_index
    }
}

/// One corrective write: `id` moves from order `from` to order `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub id: Uuid,
    pub from: u32,
    pub to: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedCorrection {
    pub parent_id: Uuid,
    pub correction: Correction,
    pub error: String,
}

/// The primary write of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub item_id: Uuid,
    pub parent_id: Uuid,
    pub sequence_order: u32,
}

/// What a resequencing operation did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub kind: EntityKind,
    pub placed: Option<Placement>,
    pub removed: Option<Uuid>,
    pub corrections: Vec<Correction>,
    pub failed: Vec<FailedCorrection>,
    /// Reads made while waiting for the primary write to become visible.
    pub settle_attempts: u32,
    /// The re-read never reflected the primary write; corrections were
    /// planned against possibly outdated data.
    pub stale: bool,
}

impl ReconcileOutcome {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            placed: None,
            removed: None,
            corrections: Vec::new(),
            failed: Vec::new(),
            settle_attempts: 0,
            stale: false,
        }
    }

    /// Nothing was written.
    pub fn is_noop(&self) -> bool {
        self.writes() == 0
    }

    pub fn is_degraded(&self) -> bool {
        self.stale || !self.failed.is_empty()
    }

    /// Store writes issued, successful or not.
    pub fn writes(&self) -> usize {
        usize::from(self.placed.is_some())
            + usize::from(self.removed.is_some())
            + self.corrections.len()
            + self.failed.len()
    }
}

/// The 1-based order for a 0-based position, saturating for positions
/// past the end.
pub(crate) fn order_at(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1)
}

/// Corrective writes that renumber `children` to `1..=n`.
///
/// `children` are the siblings under one parent as just read; their order
/// is normalised with [`sibling_order`]. When `pinned` is given the item
/// with that id is placed at that 0-based index (clamped) regardless of
/// ties with its siblings. A pinned item missing from `children` still
/// occupies its slot, and no correction is emitted for it.
pub fn plan_corrections<E: Sequenced>(
    children: &[E],
    pinned: Option<(Uuid, usize)>,
) -> Vec<Correction> {
    let mut sorted: Vec<&E> = children.iter().collect();
    sorted.sort_by(|a, b| sibling_order(*a, *b));

    let mut slots: Vec<Option<&E>> = sorted.into_iter().map(Some).collect();
    if let Some((pinned_id, index)) = pinned {
        let pinned_item = slots
            .iter()
            .position(|slot| slot.is_some_and(|child| child.id() == pinned_id))
            .and_then(|position| slots.remove(position));
        let index = index.min(slots.len());
        slots.insert(index, pinned_item);
    }

    slots
        .into_iter()
        .enumerate()
        .filter_map(|(position, slot)| {
            let child = slot?;
            let expected = position as u32 + 1;
            (child.sequence_order() != expected).then(|| Correction {
                id: child.id(),
                from: child.sequence_order(),
                to: expected,
            })
        })
        .collect()
}

/// Resequencing operations for one record type.
pub struct Resequencer<S, E> {
    store: Arc<S>,
    cache: Arc<ReconciliationCache>,
    bus: EventBus,
    settle: SettlePolicy,
    gate: Arc<Mutex<()>>,
    _kind: PhantomData<fn() -> E>,
}

impl<S, E> Clone for Resequencer<S, E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            bus: self.bus.clone(),
            settle: self.settle,
            gate: Arc::clone(&self.gate),
            _kind: PhantomData,
        }
    }
}

impl<S, E> Resequencer<S, E>
where
    E: Sequenced + Cached,
    S: EntityStore<E> + 'static,
{
    pub fn new(
        store: Arc<S>,
        cache: Arc<ReconciliationCache>,
        bus: EventBus,
        settle: SettlePolicy,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            settle,
            gate: Arc::new(Mutex::new(())),
            _kind: PhantomData,
        }
    }

    /// Serializes this resequencer's operations with every other holder of `gate`.
    pub fn with_gate(mut self, gate: Arc<Mutex<()>>) -> Self {
        self.gate = gate;
        self
    }

    /// Moves an item within its parent or to another parent.
    ///
    /// A drop onto the original position issues no writes at all.
    pub async fn move_item(
        &self,
        intent: MoveIntent,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome, ResequenceError> {
        if intent.is_noop() {
            debug!(kind = ?E::KIND, item = %intent.item_id, "dropped in place, nothing to do");
            return Ok(ReconcileOutcome::new(E::KIND));
        }
        let _serial = self.gate.lock().await;
        if cancel.is_cancelled() {
            return Err(ResequenceError::Cancelled);
        }
        self.ensure_child_of(intent.item_id, intent.source_parent_id)
            .await?;

        let order = order_at(intent.destination_index);
        let new_parent = intent
            .is_cross_parent()
            .then_some(intent.destination_parent_id);
        EntityStore::<E>::update(
            self.store.as_ref(),
            intent.item_id,
            E::reposition(new_parent, order),
        )
        .await
        .map_err(|source| ResequenceError::Placement {
            kind: E::KIND,
            item_id: intent.item_id,
            source,
        })?;

        let mut outcome = ReconcileOutcome::new(E::KIND);
        let placement = Placement {
            item_id: intent.item_id,
            parent_id: intent.destination_parent_id,
            sequence_order: order,
        };
        self.placed(&mut outcome, placement);

        let mut parents = vec![(
            intent.destination_parent_id,
            Some((intent.item_id, intent.destination_index)),
        )];
        if intent.is_cross_parent() {
            parents.push((intent.source_parent_id, None));
        }
        let item_id = intent.item_id;
        let parent_id = intent.destination_parent_id;
        self.reconcile(&mut outcome, &parents, move |records: &[E]| {
            records.iter().any(|record| {
                record.id() == item_id
                    && record.parent_id() == parent_id
                    && record.sequence_order() == order
            })
        })
        .await;
        Ok(outcome)
    }

    /// Creates `draft` and makes room for it at `destination_index` among
    /// its new siblings. Only the destination parent is reconciled.
    pub async fn insert(
        &self,
        draft: E::Draft,
        destination_index: usize,
        cancel: &CancelToken,
    ) -> Result<(E, ReconcileOutcome), ResequenceError> {
        draft.validate()?;
        let _serial = self.gate.lock().await;
        if cancel.is_cancelled() {
            return Err(ResequenceError::Cancelled);
        }
        let created = EntityStore::<E>::create(self.store.as_ref(), draft)
            .await
            .map_err(|source| ResequenceError::Insertion {
                kind: E::KIND,
                source,
            })?;

        let mut outcome = ReconcileOutcome::new(E::KIND);
        let placement = Placement {
            item_id: created.id(),
            parent_id: created.parent_id(),
            sequence_order: created.sequence_order(),
        };
        self.placed(&mut outcome, placement);

        let item_id = created.id();
        self.reconcile(
            &mut outcome,
            &[(created.parent_id(), Some((item_id, destination_index)))],
            move |records: &[E]| records.iter().any(|record| record.id() == item_id),
        )
        .await;
        Ok((created, outcome))
    }

    /// Deletes an item and closes the gap it leaves.
    ///
    /// An item that is not a child of `parent_id` is rejected before the delete.
    pub async fn remove(
        &self,
        item_id: Uuid,
        parent_id: Uuid,
    ) -> Result<ReconcileOutcome, ResequenceError> {
        let _serial = self.gate.lock().await;
        self.ensure_child_of(item_id, parent_id).await?;
        EntityStore::<E>::delete(self.store.as_ref(), item_id)
            .await
            .map_err(|source| ResequenceError::Placement {
                kind: E::KIND,
                item_id,
                source,
            })?;

        let mut outcome = ReconcileOutcome::new(E::KIND);
        outcome.removed = Some(item_id);
        self.cache.invalidate(E::KIND);
        self.bus.emit(CurriculumEvent::ItemRemoved {
            kind: E::KIND,
            item_id,
            parent_id,
        });

        self.reconcile(&mut outcome, &[(parent_id, None)], move |records: &[E]| {
            records.iter().all(|record| record.id() != item_id)
        })
        .await;
        Ok(outcome)
    }

    /// Renumbers the children of `parent_id` to `1..=n` without moving anything.
    pub async fn close_gaps(&self, parent_id: Uuid) -> Result<ReconcileOutcome, ResequenceError> {
        let _serial = self.gate.lock().await;
        let records = self
            .cache
            .collection::<E>()
            .refresh(self.store.as_ref())
            .await
            .map_err(|source| ResequenceError::Read {
                kind: E::KIND,
                source,
            })?;

        let mut outcome = ReconcileOutcome::new(E::KIND);
        outcome.settle_attempts = 1;
        self.correct(&mut outcome, &records, &[(parent_id, None)])
            .await;
        Ok(outcome)
    }

    async fn ensure_child_of(&self, item_id: Uuid, parent_id: Uuid) -> Result<(), ResequenceError> {
        let collection = self.cache.collection::<E>();
        let read_failed = |source: StoreError| ResequenceError::Read {
            kind: E::KIND,
            source,
        };
        let is_child = |records: &[E]| {
            records
                .iter()
                .any(|record| record.id() == item_id && record.parent_id() == parent_id)
        };

        let cached = collection
            .read(self.store.as_ref())
            .await
            .map_err(read_failed)?;
        if is_child(&cached) {
            return Ok(());
        }
        // The snapshot may predate the item; confirm against the store.
        let fresh = collection
            .refresh(self.store.as_ref())
            .await
            .map_err(read_failed)?;
        if is_child(&fresh) {
            Ok(())
        } else {
            Err(ResequenceError::UnknownItem {
                kind: E::KIND,
                item_id,
                parent_id,
            })
        }
    }

    fn placed(&self, outcome: &mut ReconcileOutcome, placement: Placement) {
        debug!(
            kind = ?E::KIND,
            item = %placement.item_id,
            parent = %placement.parent_id,
            order = placement.sequence_order,
            "placed"
        );
        outcome.placed = Some(placement);
        self.cache.invalidate(E::KIND);
        self.bus.emit(CurriculumEvent::ItemPlaced {
            kind: E::KIND,
            item_id: placement.item_id,
            parent_id: placement.parent_id,
            sequence_order: placement.sequence_order,
        });
    }

    /// Settles on the primary write, then corrects every listed parent.
    async fn reconcile<P>(
        &self,
        outcome: &mut ReconcileOutcome,
        parents: &[(Uuid, Option<(Uuid, usize)>)],
        visible: P,
    ) where
        P: Fn(&[E]) -> bool + Send,
    {
        let span = info_span!("reconcile", kind = ?E::KIND, parents = parents.len());
        self.settle_and_correct(outcome, parents, visible)
            .instrument(span)
            .await;
    }

    async fn settle_and_correct<P>(
        &self,
        outcome: &mut ReconcileOutcome,
        parents: &[(Uuid, Option<(Uuid, usize)>)],
        visible: P,
    ) where
        P: Fn(&[E]) -> bool + Send,
    {
        let settled = self
            .cache
            .collection::<E>()
            .settle(self.store.as_ref(), self.settle, visible)
            .await;
        let settled = match settled {
            Ok(settled) => settled,
            Err(err) => {
                // The primary write has landed; the parents stay as they are.
                warn!(kind = ?E::KIND, error = %err, "re-read after placement failed");
                outcome.stale = true;
                self.degrade(outcome, parents);
                return;
            }
        };
        outcome.settle_attempts = settled.attempts;
        outcome.stale = !settled.converged;
        self.correct(outcome, &settled.records, parents).await;
    }

    async fn correct(
        &self,
        outcome: &mut ReconcileOutcome,
        records: &[E],
        parents: &[(Uuid, Option<(Uuid, usize)>)],
    ) {
        let pinned_ids: Vec<Uuid> = parents
            .iter()
            .filter_map(|(_, pinned)| pinned.map(|(id, _)| id))
            .collect();

        let mut planned = Vec::new();
        for &(parent_id, pinned) in parents {
            // A pinned item belongs to its destination even when the re-read
            // still shows it under its old parent.
            let children: Vec<E> = records
                .iter()
                .filter(|record| {
                    let id = record.id();
                    if outcome.removed == Some(id) {
                        return false;
                    }
                    match pinned {
                        Some((pinned_id, _)) if pinned_id == id => true,
                        _ => record.parent_id() == parent_id && !pinned_ids.contains(&id),
                    }
                })
                .cloned()
                .collect();
            for correction in plan_corrections(&children, pinned) {
                planned.push((parent_id, correction));
            }
        }

        if planned.is_empty() {
            for &(parent_id, _) in parents {
                self.bus.emit(CurriculumEvent::Reconciled {
                    kind: E::KIND,
                    parent_id,
                    corrections: 0,
                });
            }
            if outcome.stale {
                self.degrade(outcome, parents);
            }
            return;
        }

        let store = self.store.as_ref();
        let writes = planned.iter().map(|&(_, correction)| {
            EntityStore::<E>::update(store, correction.id, E::reposition(None, correction.to))
        });
        let results = join_all(writes).await;

        let mut applied: Vec<Uuid> = Vec::new();
        for ((parent_id, correction), result) in planned.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    applied.push(parent_id);
                    outcome.corrections.push(correction);
                }
                Err(err) => {
                    warn!(
                        kind = ?E::KIND,
                        item = %correction.id,
                        to = correction.to,
                        error = %err,
                        "corrective write failed"
                    );
                    outcome.failed.push(FailedCorrection {
                        parent_id,
                        correction,
                        error: err.to_string(),
                    });
                }
            }
        }

        if outcome.is_degraded() {
            self.degrade(outcome, parents);
        } else {
            for &(parent_id, _) in parents {
                self.bus.emit(CurriculumEvent::Reconciled {
                    kind: E::KIND,
                    parent_id,
                    corrections: applied.iter().filter(|id| **id == parent_id).count(),
                });
            }
            self.cache.invalidate(E::KIND);
            info!(
                kind = ?E::KIND,
                corrections = outcome.corrections.len(),
                "sequence reconciled"
            );
        }
    }

    fn degrade(&self, outcome: &ReconcileOutcome, parents: &[(Uuid, Option<(Uuid, usize)>)]) {
        warn!(
            kind = ?E::KIND,
            failed = outcome.failed.len(),
            stale = outcome.stale,
            "sequence may be inconsistent, invalidating every collection"
        );
        self.cache.invalidate_all();
        self.bus.emit(CurriculumEvent::ReconciliationDegraded {
            kind: E::KIND,
            parent_ids: parents.iter().map(|(parent_id, _)| *parent_id).collect(),
            failed: outcome.failed.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{NewUnit, ProgressionRule, Unit, UnlockConditions};
    use crate::store::{children_of, is_dense};
    use chrono::{Duration, Utc};

    fn unit(series_id: Uuid, order: u32, age: i64) -> Unit {
        let now = Utc::now();
        Unit {
            id: Uuid::new_v4(),
            series_id,
            name: format!("u{order}"),
            sequence_order: order,
            progression_rule: ProgressionRule::Free,
            unlock_conditions: UnlockConditions::default(),
            estimated_hours: None,
            description: None,
            objectives: Vec::new(),
            created_date: now - Duration::seconds(age),
            updated_date: now,
        }
    }

    #[test]
    fn dense_siblings_need_no_corrections() {
        let parent = Uuid::new_v4();
        let children = vec![unit(parent, 1, 3), unit(parent, 2, 2), unit(parent, 3, 1)];
        assert!(plan_corrections(&children, None).is_empty());
    }

    #[test]
    fn gaps_are_closed_in_order() {
        let parent = Uuid::new_v4();
        let children = vec![unit(parent, 7, 1), unit(parent, 2, 2), unit(parent, 4, 3)];
        let plan = plan_corrections(&children, None);
        let targets: Vec<(Uuid, u32)> = plan.iter().map(|c| (c.id, c.to)).collect();
        assert_eq!(
            targets,
            vec![(children[1].id, 1), (children[2].id, 2), (children[0].id, 3)]
        );
    }

    #[test]
    fn pinned_item_wins_ties() {
        let parent = Uuid::new_v4();
        // After placing the third item at order 1 it ties with the first,
        // which is older and would otherwise sort ahead of it.
        let a = unit(parent, 1, 10);
        let b = unit(parent, 2, 9);
        let mut moved = unit(parent, 3, 1);
        moved.sequence_order = 1;

        let plan = plan_corrections(&[a.clone(), b.clone(), moved.clone()], Some((moved.id, 0)));
        assert_eq!(
            plan,
            vec![
                Correction {
                    id: a.id,
                    from: 1,
                    to: 2
                },
                Correction {
                    id: b.id,
                    from: 2,
                    to: 3
                },
            ]
        );
    }

    #[test]
    fn pinned_index_is_clamped() {
        let parent = Uuid::new_v4();
        let a = unit(parent, 1, 2);
        let mut moved = unit(parent, 99, 1);
        moved.sequence_order = 99;
        let plan = plan_corrections(&[a, moved.clone()], Some((moved.id, 40)));
        assert_eq!(
            plan,
            vec![Correction {
                id: moved.id,
                from: 99,
                to: 2
            }]
        );
    }

    #[test]
    fn invisible_pinned_item_keeps_its_slot() {
        let parent = Uuid::new_v4();
        let a = unit(parent, 1, 2);
        let b = unit(parent, 2, 1);
        let plan = plan_corrections(&[a.clone(), b.clone()], Some((Uuid::new_v4(), 0)));
        let targets: Vec<u32> = plan.iter().map(|c| c.to).collect();
        assert_eq!(targets, vec![2, 3]);
    }

    #[test]
    fn far_positions_saturate() {
        assert_eq!(order_at(0), 1);
        assert_eq!(order_at(u32::MAX as usize), u32::MAX);
        assert_eq!(order_at(usize::MAX), u32::MAX);
    }

    #[test]
    fn noop_detection() {
        let parent = Uuid::new_v4();
        let item = Uuid::new_v4();
        assert!(MoveIntent::within(parent, item, 2, 2).is_noop());
        assert!(!MoveIntent::within(parent, item, 2, 1).is_noop());
        let cross = MoveIntent {
            destination_parent_id: Uuid::new_v4(),
            ..MoveIntent::within(parent, item, 0, 0)
        };
        assert!(!cross.is_noop());
    }

    async fn seeded(count: u32) -> (Arc<MemoryStore>, Uuid, Vec<Unit>) {
        let store = Arc::new(MemoryStore::new());
        let series_id = Uuid::new_v4();
        let mut units = Vec::new();
        for order in 1..=count {
            let created: Unit = store
                .create(NewUnit {
                    series_id,
                    name: format!("Unit {order}"),
                    sequence_order: order,
                    progression_rule: ProgressionRule::Free,
                    unlock_conditions: UnlockConditions::default(),
                    estimated_hours: None,
                    description: None,
                    objectives: Vec::new(),
                })
                .await
                .unwrap();
            units.push(created);
        }
        (store, series_id, units)
    }

    fn resequencer(store: &Arc<MemoryStore>, bus: EventBus) -> Resequencer<MemoryStore, Unit> {
        Resequencer::new(
            Arc::clone(store),
            Arc::new(ReconciliationCache::new(bus.clone())),
            bus,
            SettlePolicy::immediate(),
        )
    }

    #[tokio::test]
    async fn move_down_renumbers_the_siblings_in_between() {
        let (store, series_id, units) = seeded(4).await;
        let resequencer = resequencer(&store, EventBus::new());

        let outcome = resequencer
            .move_item(
                MoveIntent::within(series_id, units[0].id, 0, 2),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert!(!outcome.is_degraded());

        let all: Vec<Unit> = store.list(None).await.unwrap();
        assert!(is_dense(&all, series_id));
        let names: Vec<String> = children_of(&all, series_id)
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, ["Unit 2", "Unit 3", "Unit 1", "Unit 4"]);
    }

    #[tokio::test]
    async fn moving_a_stranger_is_rejected_before_any_write() {
        let (store, series_id, _) = seeded(2).await;
        let resequencer = resequencer(&store, EventBus::new());

        let err = resequencer
            .move_item(
                MoveIntent::within(series_id, Uuid::new_v4(), 0, 1),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResequenceError::UnknownItem { .. }));
    }

    #[tokio::test]
    async fn remove_closes_the_gap() {
        let (store, series_id, units) = seeded(3).await;
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let resequencer = resequencer(&store, bus);

        let outcome = resequencer.remove(units[0].id, series_id).await.unwrap();
        assert_eq!(outcome.removed, Some(units[0].id));
        assert_eq!(outcome.corrections.len(), 2);

        let all: Vec<Unit> = store.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(is_dense(&all, series_id));
        assert!(matches!(
            rx.recv().await.unwrap(),
            CurriculumEvent::ItemRemoved { .. }
        ));
    }

    #[tokio::test]
    async fn remove_under_the_wrong_parent_is_rejected() {
        let (store, series_id, units) = seeded(3).await;
        let resequencer = resequencer(&store, EventBus::new());

        let err = resequencer
            .remove(units[0].id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ResequenceError::UnknownItem { item_id, .. } if item_id == units[0].id));

        let all: Vec<Unit> = store.list(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(is_dense(&all, series_id));
    }

    #[tokio::test]
    async fn far_destination_lands_last() {
        let (store, series_id, units) = seeded(3).await;
        let resequencer = resequencer(&store, EventBus::new());

        let outcome = resequencer
            .move_item(
                MoveIntent::within(series_id, units[0].id, 0, u32::MAX as usize),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert!(!outcome.is_degraded());

        let all: Vec<Unit> = store.list(None).await.unwrap();
        assert!(is_dense(&all, series_id));
        assert_eq!(store.get::<Unit>(units[0].id).unwrap().sequence_order, 3);
    }

    #[tokio::test]
    async fn close_gaps_is_idempotent() {
        let (store, series_id, units) = seeded(3).await;
        let _: Unit = store
            .update(units[2].id, Unit::reposition(None, 9))
            .await
            .unwrap();
        let resequencer = resequencer(&store, EventBus::new());

        let first = resequencer.close_gaps(series_id).await.unwrap();
        assert_eq!(first.corrections.len(), 1);
        let second = resequencer.close_gaps(series_id).await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn cancelled_move_writes_nothing() {
        let (store, series_id, units) = seeded(2).await;
        let resequencer = resequencer(&store, EventBus::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = resequencer
            .move_item(MoveIntent::within(series_id, units[1].id, 1, 0), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ResequenceError::Cancelled));
        assert_eq!(store.get::<Unit>(units[1].id).unwrap().sequence_order, 2);
    }
}
