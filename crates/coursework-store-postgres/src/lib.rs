//! PostgreSQL implementation of the coursework entity store.
//!
//! Every collection lives in one table of JSONB documents keyed by id and
//! tagged with the entity kind. Updates are shallow merges (`record || patch`),
//! matching the partial-update contract of `EntityStore::update`.
//!
//! # Features
//!
//! - One statement per call; nothing spans records
//! - Listings sorted on any record field, ties broken by insertion time
//! - Pool timeouts, I/O failures and serialization conflicts surface as
//!   transient errors
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE curriculum_entities (
//!     id UUID PRIMARY KEY,
//!     kind TEXT NOT NULL,
//!     record JSONB NOT NULL,
//!
//!     -- Timestamps
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE INDEX idx_curriculum_entities_kind ON curriculum_entities (kind, created_at);
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use coursework::CurriculumEngineBuilder;
//! use coursework_store_postgres::PgEntityStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/curriculum").await?;
//! let store = PgEntityStore::new(pool);
//! store.migrate().await?;
//!
//! let engine = CurriculumEngineBuilder::new(store).build();
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursework::{
    check_patch, Draft, Entity, EntityKind, EntityStore, SortKey, StoreError, StoreResult,
};
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL entity store serving every collection of the hierarchy.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    /// Create a new PostgreSQL entity store.
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the table and index if they do not exist yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS curriculum_entities (
                id UUID PRIMARY KEY,
                kind TEXT NOT NULL,
                record JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_curriculum_entities_kind
                ON curriculum_entities (kind, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of records of `kind`.
    pub async fn count(&self, kind: EntityKind) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM curriculum_entities WHERE kind = $1")
            .bind(kind.collection())
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.get("total"))
    }
}

/// Maps a driver error onto the store taxonomy.
fn classify(err: sqlx::Error) -> StoreError {
    let transient = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        // serialization_failure, deadlock_detected
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001" | "40P01")),
        _ => false,
    };
    if transient {
        StoreError::Transient(err.to_string())
    } else {
        StoreError::Backend(err.into())
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

/// The stored document for a new record: the draft plus identity and
/// timestamps.
fn new_record(draft: Value, id: Uuid, now: DateTime<Utc>) -> StoreResult<Map<String, Value>> {
    let now = serde_json::to_value(now)?;
    let mut record = as_object(draft)?;
    record.insert("id".into(), Value::String(id.to_string()));
    record.insert("created_date".into(), now.clone());
    record.insert("updated_date".into(), now);
    Ok(record)
}

/// `ORDER BY` for a listing; `$2` carries the sort field when there is one.
fn order_clause(sort: Option<&SortKey>) -> &'static str {
    match sort {
        Some(key) if key.descending => "ORDER BY record -> $2 DESC NULLS LAST, created_at, id",
        Some(_) => "ORDER BY record -> $2 ASC NULLS LAST, created_at, id",
        None => "ORDER BY created_at, id",
    }
}

fn decode<E: Entity>(record: Value) -> StoreResult<E> {
    Ok(serde_json::from_value(record)?)
}

#[async_trait]
impl<E: Entity> EntityStore<E> for PgEntityStore {
    async fn create(&self, draft: E::Draft) -> StoreResult<E> {
        draft.validate()?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = Value::Object(new_record(serde_json::to_value(&draft)?, id, now)?);
        let entity = decode::<E>(record.clone())?;

        sqlx::query(
            r#"
            INSERT INTO curriculum_entities (id, kind, record, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(id)
        .bind(E::KIND.collection())
        .bind(&record)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        debug!(kind = ?E::KIND, %id, "record created");
        Ok(entity)
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> StoreResult<E> {
        let mut patch = as_object(serde_json::to_value(&patch)?)?;
        check_patch(E::KIND, &patch)?;
        let now = Utc::now();
        patch.insert("updated_date".into(), serde_json::to_value(now)?);

        let row = sqlx::query(
            r#"
            UPDATE curriculum_entities
            SET record = record || $3,
                updated_at = $4
            WHERE id = $1 AND kind = $2
            RETURNING record
            "#,
        )
        .bind(id)
        .bind(E::KIND.collection())
        .bind(Value::Object(patch))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        let row = row.ok_or(StoreError::NotFound { kind: E::KIND, id })?;
        debug!(kind = ?E::KIND, %id, "record updated");
        decode(row.get("record"))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM curriculum_entities WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(E::KIND.collection())
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: E::KIND, id });
        }
        debug!(kind = ?E::KIND, %id, "record deleted");
        Ok(())
    }

    async fn list(&self, sort: Option<&SortKey>) -> StoreResult<Vec<E>> {
        let sql = format!(
            "SELECT record FROM curriculum_entities WHERE kind = $1 {}",
            order_clause(sort)
        );
        let mut query = sqlx::query(&sql).bind(E::KIND.collection());
        if let Some(key) = sort {
            query = query.bind(key.field.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(classify)?;
        rows.into_iter()
            .map(|row| decode(row.get("record")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_records_carry_identity_and_timestamps() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = new_record(json!({ "name": "Calculus I" }), id, now).unwrap();

        assert_eq!(record["id"], json!(id.to_string()));
        assert_eq!(record["name"], json!("Calculus I"));
        assert_eq!(record["created_date"], record["updated_date"]);
    }

    #[test]
    fn non_object_drafts_are_rejected() {
        let err = new_record(json!(["not", "a", "record"]), Uuid::new_v4(), Utc::now());
        assert!(matches!(err, Err(StoreError::Backend(_))));
    }

    #[test]
    fn listing_order_follows_the_sort_key() {
        assert_eq!(order_clause(None), "ORDER BY created_at, id");
        assert!(order_clause(Some(&SortKey::sequence_order())).contains("ASC NULLS LAST"));
        assert!(order_clause(Some(&SortKey::parse("-created_date"))).contains("DESC"));
    }

    #[test]
    fn pool_exhaustion_is_transient() {
        assert!(classify(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!classify(sqlx::Error::RowNotFound).is_transient());
    }
}
