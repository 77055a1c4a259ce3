//! The entity store contract.
//!
//! Stores offer single-record reads and writes only. Nothing here is
//! transactional: callers that need several writes to land together must
//! tolerate partial completion.

use crate::error::{StoreResult, ValidationError};
use crate::model::{Component, Container, Entity, EntityKind, Pathway, Sequenced, Series, Unit};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Field ordering for [`EntityStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Parses the `"-field"` shorthand for descending order.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(field) => Self::descending(field),
            None => Self::ascending(raw),
        }
    }

    pub fn sequence_order() -> Self {
        Self::ascending("sequence_order")
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            f.write_str(&self.field)
        }
    }
}

/// Create/update/delete/list for one record type.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    async fn create(&self, draft: E::Draft) -> StoreResult<E>;

    /// Applies a partial update; absent patch fields are left untouched.
    async fn update(&self, id: Uuid, patch: E::Patch) -> StoreResult<E>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    async fn list(&self, sort: Option<&SortKey>) -> StoreResult<Vec<E>>;
}

#[async_trait]
impl<E, S> EntityStore<E> for Arc<S>
where
    E: Entity,
    S: EntityStore<E> + ?Sized,
{
    async fn create(&self, draft: E::Draft) -> StoreResult<E> {
        (**self).create(draft).await
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> StoreResult<E> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        (**self).delete(id).await
    }

    async fn list(&self, sort: Option<&SortKey>) -> StoreResult<Vec<E>> {
        (**self).list(sort).await
    }
}

/// A store that serves every collection of the hierarchy.
pub trait CurriculumStore:
    EntityStore<Container>
    + EntityStore<Pathway>
    + EntityStore<Series>
    + EntityStore<Unit>
    + EntityStore<Component>
    + Send
    + Sync
    + 'static
{
}

impl<S> CurriculumStore for S where
    S: EntityStore<Container>
        + EntityStore<Pathway>
        + EntityStore<Series>
        + EntityStore<Unit>
        + EntityStore<Component>
        + Send
        + Sync
        + 'static
{
}

/// Rejects patch fields no record may hold.
///
/// Stores call this on the serialized patch before merging it.
pub fn check_patch(kind: EntityKind, patch: &Map<String, Value>) -> Result<(), ValidationError> {
    if let Some(order) = patch.get("sequence_order") {
        if order.as_u64() == Some(0) {
            return Err(ValidationError::new(kind, "sequence_order", "must be >= 1"));
        }
    }
    if let Some(field) = kind.parent_field() {
        if let Some(parent) = patch.get(field) {
            if parent.as_str() == Some(&Uuid::nil().to_string()) {
                return Err(ValidationError::new(kind, field, "parent id is required"));
            }
        }
    }
    if let Some(name) = patch.get("name").and_then(Value::as_str) {
        if name.trim().is_empty() {
            return Err(ValidationError::new(kind, "name", "must not be empty"));
        }
    }
    Ok(())
}

/// Total order over siblings: `sequence_order`, then creation time, then id.
pub fn sibling_order<E: Sequenced>(a: &E, b: &E) -> Ordering {
    a.sequence_order()
        .cmp(&b.sequence_order())
        .then_with(|| a.created_date().cmp(&b.created_date()))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Children of `parent_id`, sorted with [`sibling_order`].
pub fn children_of<E: Sequenced>(records: &[E], parent_id: Uuid) -> Vec<E> {
    let mut children: Vec<E> = records
        .iter()
        .filter(|record| record.parent_id() == parent_id)
        .cloned()
        .collect();
    children.sort_by(sibling_order);
    children
}

/// Whether the children of `parent_id` are numbered exactly `1..=n`.
pub fn is_dense<E: Sequenced>(records: &[E], parent_id: Uuid) -> bool {
    children_of(records, parent_id)
        .iter()
        .enumerate()
        .all(|(index, child)| child.sequence_order() as usize == index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_shorthand() {
        assert_eq!(SortKey::parse("-created_date"), SortKey::descending("created_date"));
        assert_eq!(SortKey::parse("sequence_order"), SortKey::sequence_order());
        assert_eq!(SortKey::descending("name").to_string(), "-name");
    }
}
