//! Error types for the curriculum engine.
//!
//! Store failures are classified the same way job failures are: transient
//! errors may succeed on a later attempt, everything else is terminal for
//! that write.

use crate::model::EntityKind;
use thiserror::Error;
use uuid::Uuid;

/// A single field-level problem found while validating a draft or patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}.{field}: {reason}")]
pub struct ValidationError {
    pub kind: EntityKind,
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(kind: EntityKind, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            field,
            reason: reason.into(),
        }
    }
}

/// Failure of one store call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind:?} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("write conflict on {kind:?} {id}")]
    Conflict { kind: EntityKind, id: Uuid },

    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether repeating the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Conflict { .. })
    }
}

/// Failure of a resequencing operation as a whole.
///
/// Failed corrective writes are not errors at this level; they are reported
/// on [`ReconcileOutcome`](crate::ReconcileOutcome) after a successful
/// placement.
#[derive(Debug, Error)]
pub enum ResequenceError {
    #[error("placement of {kind:?} {item_id} failed: {source}")]
    Placement {
        kind: EntityKind,
        item_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("creating {kind:?} failed: {source}")]
    Insertion {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },

    #[error("{kind:?} {item_id} is not a child of {parent_id}")]
    UnknownItem {
        kind: EntityKind,
        item_id: Uuid,
        parent_id: Uuid,
    },

    #[error("reading {kind:?} siblings failed: {source}")]
    Read {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },

    #[error("no component template named {0:?}")]
    UnknownTemplate(String),

    #[error("invalid draft: {0}")]
    InvalidDraft(#[from] ValidationError),

    #[error("operation cancelled before placement")]
    Cancelled,
}

/// Problems with a generated or hand-written specification tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutlineError {
    #[error("outline is missing the period list")]
    MissingPeriods,

    #[error("period {period} has an empty name")]
    EmptyPeriodName { period: usize },

    #[error("discipline {discipline} of period {period} has an empty name")]
    EmptyDisciplineName { period: usize, discipline: usize },

    #[error("discipline code {code:?} is declared more than once")]
    DuplicateCode { code: String },

    #[error("malformed outline: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for OutlineError {
    fn from(err: serde_json::Error) -> Self {
        OutlineError::Malformed(err.to_string())
    }
}

/// Failure reported by the content generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("content generation failed: {0}")]
    Upstream(#[from] anyhow::Error),

    #[error("generated content did not match the requested schema: {0}")]
    Schema(#[from] OutlineError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Transient("timeout".into()).is_transient());
        assert!(StoreError::Conflict {
            kind: EntityKind::Unit,
            id: Uuid::new_v4()
        }
        .is_transient());
        assert!(!StoreError::NotFound {
            kind: EntityKind::Unit,
            id: Uuid::new_v4()
        }
        .is_transient());
        let validation = ValidationError::new(EntityKind::Series, "name", "must not be empty");
        assert!(!StoreError::from(validation).is_transient());
    }

    #[test]
    fn validation_error_names_the_field() {
        let err = ValidationError::new(EntityKind::Pathway, "sequence_order", "must be >= 1");
        assert_eq!(err.to_string(), "Pathway.sequence_order: must be >= 1");
    }
}
