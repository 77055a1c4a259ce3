//! Testing utilities for coursework.
//!
//! - [`FlakyStore`] wraps any store, counts calls, injects write failures and
//!   can serve stale listings to exercise read-after-write handling.
//! - [`fixtures`] builds small outlines with known prerequisite shapes.
//! - [`assert_dense`] and [`orders`] check sibling numbering.

use async_trait::async_trait;
use coursework::{
    children_of, is_dense, Entity, EntityKind, EntityStore, Sequenced, SortKey, StoreError,
    StoreResult,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

pub mod fixtures;

/// The kind of store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
    List,
}

/// One recorded store call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Op,
    pub kind: EntityKind,
    pub id: Option<Uuid>,
    /// The serialized draft or patch, `Null` for deletes and listings.
    pub payload: Value,
    pub failed: bool,
}

type FaultFn = dyn Fn(&Call) -> bool + Send + Sync;

struct Fault {
    matches: Box<FaultFn>,
    /// Remaining failures; `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    faults: Vec<Fault>,
    stale: HashMap<EntityKind, (usize, Vec<Value>)>,
}

/// Fault-injecting, call-recording wrapper around a store.
///
/// Clones share the same state.
pub struct FlakyStore<S> {
    inner: S,
    state: Arc<Mutex<State>>,
    stale_reads: Arc<AtomicUsize>,
}

impl<S: Clone> Clone for FlakyStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            state: Arc::clone(&self.state),
            stale_reads: Arc::clone(&self.stale_reads),
        }
    }
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(State::default())),
            stale_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails every call matching `predicate` with a transient error.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&Call) -> bool + Send + Sync + 'static,
    {
        self.state().faults.push(Fault {
            matches: Box::new(predicate),
            remaining: None,
        });
    }

    /// Fails the next `times` calls matching `predicate`.
    pub fn fail_times<F>(&self, times: usize, predicate: F)
    where
        F: Fn(&Call) -> bool + Send + Sync + 'static,
    {
        self.state().faults.push(Fault {
            matches: Box::new(predicate),
            remaining: Some(times),
        });
    }

    /// Fails creation of any record whose `name` equals `name`.
    pub fn fail_create_named(&self, name: &str) {
        let name = name.to_owned();
        self.fail_when(move |call| {
            call.op == Op::Create && call.payload.get("name").and_then(Value::as_str) == Some(&name)
        });
    }

    /// Fails every update of the record `id`.
    pub fn fail_updates_of(&self, id: Uuid) {
        self.fail_when(move |call| call.op == Op::Update && call.id == Some(id));
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// After each successful write, the next `reads` listings of that
    /// collection return what the collection looked like before the write.
    /// Zero turns stale listings off.
    pub fn set_stale_reads(&self, reads: usize) {
        self.stale_reads.store(reads, Ordering::SeqCst);
        if reads == 0 {
            self.state().stale.clear();
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state().calls.iter().filter(|call| call.op == op).count()
    }

    /// Creates, updates and deletes issued, failed ones included.
    pub fn writes(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.op != Op::List)
            .count()
    }

    pub fn failed_writes(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.op != Op::List && call.failed)
            .count()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Records `call`, deciding whether it fails.
    fn admit(&self, mut call: Call) -> StoreResult<()> {
        let mut state = self.state();
        let fault = state.faults.iter_mut().find(|fault| {
            fault.remaining != Some(0) && (fault.matches)(&call)
        });
        if let Some(fault) = fault {
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining -= 1;
            }
            call.failed = true;
            let message = format!("injected {:?} failure on {:?}", call.op, call.kind);
            state.calls.push(call);
            return Err(StoreError::Transient(message));
        }
        state.calls.push(call);
        Ok(())
    }

    fn stale_listing(&self, kind: EntityKind) -> Option<Vec<Value>> {
        let mut state = self.state();
        let (remaining, snapshot) = state.stale.get_mut(&kind)?;
        if *remaining == 0 {
            state.stale.remove(&kind);
            return None;
        }
        *remaining -= 1;
        Some(snapshot.clone())
    }
}

impl<S> FlakyStore<S> {
    async fn arm_stale<E>(&self) -> StoreResult<()>
    where
        E: Entity,
        S: EntityStore<E>,
    {
        let reads = self.stale_reads.load(Ordering::SeqCst);
        if reads == 0 || self.state().stale.contains_key(&E::KIND) {
            return Ok(());
        }
        let before = EntityStore::<E>::list(&self.inner, None).await?;
        let snapshot = before
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.state().stale.insert(E::KIND, (reads, snapshot));
        Ok(())
    }

    /// Re-arms an existing stale window after another write.
    fn extend_stale(&self, kind: EntityKind) {
        let reads = self.stale_reads.load(Ordering::SeqCst);
        if let Some((remaining, _)) = self.state().stale.get_mut(&kind) {
            *remaining = reads;
        }
    }
}

fn payload<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[async_trait]
impl<E, S> EntityStore<E> for FlakyStore<S>
where
    E: Entity,
    S: EntityStore<E>,
{
    async fn create(&self, draft: E::Draft) -> StoreResult<E> {
        self.admit(Call {
            op: Op::Create,
            kind: E::KIND,
            id: None,
            payload: payload(&draft),
            failed: false,
        })?;
        self.arm_stale::<E>().await?;
        let created = EntityStore::<E>::create(&self.inner, draft).await?;
        self.extend_stale(E::KIND);
        Ok(created)
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> StoreResult<E> {
        self.admit(Call {
            op: Op::Update,
            kind: E::KIND,
            id: Some(id),
            payload: payload(&patch),
            failed: false,
        })?;
        self.arm_stale::<E>().await?;
        let updated = EntityStore::<E>::update(&self.inner, id, patch).await?;
        self.extend_stale(E::KIND);
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.admit(Call {
            op: Op::Delete,
            kind: E::KIND,
            id: Some(id),
            payload: Value::Null,
            failed: false,
        })?;
        self.arm_stale::<E>().await?;
        EntityStore::<E>::delete(&self.inner, id).await?;
        self.extend_stale(E::KIND);
        Ok(())
    }

    async fn list(&self, sort: Option<&SortKey>) -> StoreResult<Vec<E>> {
        self.admit(Call {
            op: Op::List,
            kind: E::KIND,
            id: None,
            payload: Value::Null,
            failed: false,
        })?;
        if let Some(snapshot) = self.stale_listing(E::KIND) {
            return snapshot
                .into_iter()
                .map(|value| serde_json::from_value(value).map_err(StoreError::from))
                .collect();
        }
        EntityStore::<E>::list(&self.inner, sort).await
    }
}

/// `(name, sequence_order)` of the children of `parent_id`, in display order.
pub fn orders<E, F>(records: &[E], parent_id: Uuid, name: F) -> Vec<(String, u32)>
where
    E: Sequenced,
    F: Fn(&E) -> &str,
{
    children_of(records, parent_id)
        .iter()
        .map(|child| (name(child).to_owned(), child.sequence_order()))
        .collect()
}

/// Panics with the offending numbering unless the children of `parent_id`
/// are numbered exactly `1..=n`.
#[track_caller]
pub fn assert_dense<E: Sequenced>(records: &[E], parent_id: Uuid) {
    if !is_dense(records, parent_id) {
        let numbering: Vec<u32> = children_of(records, parent_id)
            .iter()
            .map(Sequenced::sequence_order)
            .collect();
        panic!(
            "{:?} children of {parent_id} are not dense: {numbering:?}",
            E::KIND
        );
    }
}
