//! In-process entity store.
//!
//! Records are kept as JSON objects so that updates behave as shallow merge
//! patches, the same way a remote document store applies partial updates.
//! Clones share state.

use crate::error::{StoreError, StoreResult};
use crate::model::{Draft, Entity, EntityKind};
use crate::store::{check_patch, EntityStore, SortKey};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Slot {
    kind: EntityKind,
    seq: u64,
    record: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Inner {
    records: DashMap<Uuid, Slot>,
    next_seq: AtomicU64,
}

/// `dashmap`-backed store serving every collection.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.inner
            .records
            .iter()
            .filter(|entry| entry.value().kind == kind)
            .count()
    }

    /// Synchronous typed read of one record, mainly for assertions.
    pub fn get<E: Entity>(&self, id: Uuid) -> Option<E> {
        let slot = self.inner.records.get(&id)?;
        if slot.kind != E::KIND {
            return None;
        }
        serde_json::from_value(Value::Object(slot.record.clone())).ok()
    }

    fn decode<E: Entity>(record: &Map<String, Value>) -> StoreResult<E> {
        Ok(serde_json::from_value(Value::Object(record.clone()))?)
    }
}

fn as_object(value: Value) -> StoreResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Backend(anyhow::anyhow!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Orders JSON field values: numbers numerically, strings lexically,
/// booleans false-first, missing values last.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryStore {
    async fn create(&self, draft: E::Draft) -> StoreResult<E> {
        draft.validate()?;

        let id = Uuid::new_v4();
        let now = serde_json::to_value(Utc::now())?;
        let mut record = as_object(serde_json::to_value(&draft)?)?;
        record.insert("id".into(), Value::String(id.to_string()));
        record.insert("created_date".into(), now.clone());
        record.insert("updated_date".into(), now);

        let entity = Self::decode::<E>(&record)?;
        let seq = self.inner.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner.records.insert(
            id,
            Slot {
                kind: E::KIND,
                seq,
                record,
            },
        );
        debug!(kind = ?E::KIND, %id, "record created");
        Ok(entity)
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> StoreResult<E> {
        let patch = as_object(serde_json::to_value(&patch)?)?;
        check_patch(E::KIND, &patch)?;

        let mut slot = match self.inner.records.get_mut(&id) {
            Some(slot) if slot.kind == E::KIND => slot,
            _ => return Err(StoreError::NotFound { kind: E::KIND, id }),
        };

        let mut merged = slot.record.clone();
        for (field, value) in patch {
            merged.insert(field, value);
        }
        merged.insert("updated_date".into(), serde_json::to_value(Utc::now())?);

        let entity = Self::decode::<E>(&merged)?;
        slot.record = merged;
        debug!(kind = ?E::KIND, %id, "record updated");
        Ok(entity)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        match self
            .inner
            .records
            .remove_if(&id, |_, slot| slot.kind == E::KIND)
        {
            Some(_) => {
                debug!(kind = ?E::KIND, %id, "record deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound { kind: E::KIND, id }),
        }
    }

    async fn list(&self, sort: Option<&SortKey>) -> StoreResult<Vec<E>> {
        let mut slots: Vec<Slot> = self
            .inner
            .records
            .iter()
            .filter(|entry| entry.value().kind == E::KIND)
            .map(|entry| entry.value().clone())
            .collect();

        slots.sort_by(|a, b| {
            let by_field = match sort {
                Some(key) => {
                    let ordering =
                        compare_field(a.record.get(&key.field), b.record.get(&key.field));
                    if key.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                }
                None => Ordering::Equal,
            };
            by_field.then(a.seq.cmp(&b.seq))
        });

        slots.iter().map(|slot| Self::decode(&slot.record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewPathway, Pathway, PathwayPatch};

    fn pathway(container_id: Uuid, name: &str, order: u32) -> NewPathway {
        NewPathway {
            container_id,
            name: name.into(),
            sequence_order: order,
            duration_months: 6,
            required: true,
            description: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_identity_and_timestamps() {
        let store = MemoryStore::new();
        let container = Uuid::new_v4();
        let created: Pathway = store.create(pathway(container, "Year 1", 1)).await.unwrap();
        assert!(!created.id.is_nil());
        assert_eq!(created.container_id, container);
        assert_eq!(store.count(EntityKind::Pathway), 1);
        assert_eq!(store.get::<Pathway>(created.id), Some(created));
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_map() {
        let store = MemoryStore::new();
        let result: StoreResult<Pathway> = store.create(pathway(Uuid::new_v4(), "", 1)).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.count(EntityKind::Pathway), 0);
    }

    #[tokio::test]
    async fn update_merges_only_present_fields() {
        let store = MemoryStore::new();
        let created: Pathway = store
            .create(pathway(Uuid::new_v4(), "Year 1", 1))
            .await
            .unwrap();
        let patch = PathwayPatch {
            sequence_order: Some(4),
            ..Default::default()
        };
        let updated: Pathway = store.update(created.id, patch).await.unwrap();
        assert_eq!(updated.sequence_order, 4);
        assert_eq!(updated.name, "Year 1");
        assert!(updated.updated_date >= created.updated_date);
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_records_fail() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let updated: StoreResult<Pathway> = store.update(id, PathwayPatch::default()).await;
        assert!(matches!(updated, Err(StoreError::NotFound { .. })));
        let deleted = EntityStore::<Pathway>::delete(&store, id).await;
        assert!(matches!(deleted, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_honours_sort_key() {
        let store = MemoryStore::new();
        let container = Uuid::new_v4();
        for (name, order) in [("c", 3), ("a", 1), ("b", 2)] {
            let _: Pathway = store.create(pathway(container, name, order)).await.unwrap();
        }

        let ascending: Vec<Pathway> = store.list(Some(&SortKey::sequence_order())).await.unwrap();
        let names: Vec<_> = ascending.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        let descending: Vec<Pathway> = store
            .list(Some(&SortKey::parse("-sequence_order")))
            .await
            .unwrap();
        let names: Vec<_> = descending.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["c", "b", "a"]);

        let insertion: Vec<Pathway> = store.list(None).await.unwrap();
        let names: Vec<_> = insertion.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }
}
