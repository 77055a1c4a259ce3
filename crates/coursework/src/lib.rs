//! # Coursework
//!
//! Curriculum structure on top of a plain entity store: a five-level
//! hierarchy (Container → Pathway → Series → Unit → Component) whose siblings
//! are always numbered `1..=n`.
//!
//! ## Core Concepts
//!
//! - [`Materializer`] turns a generated [`CurriculumOutline`] into records,
//!   resolving prerequisite *codes* into series *ids* once everything exists.
//! - [`Resequencer`] applies a drag-and-drop move, re-reads, and issues the
//!   corrective writes that restore dense `sequence_order` values.
//! - [`ReconciliationCache`] holds read-through snapshots that every mutation
//!   invalidates.
//! - [`EventBus`] publishes facts ([`CurriculumEvent`]) for views.
//!
//! The store offers no transactions. Batches are best-effort and report
//! partial failure instead of rolling back.
//!
//! ## Architecture
//!
//! ```text
//! View (drag, drop, generate)
//!     │
//!     ▼ dispatch(Intent)
//! CurriculumEngine ─────────────────────────────────────────┐
//!     │                                                     │
//!     ├─► Materializer.run()                                │
//!     │       pass 1: create tree, record code → id         │
//!     │       pass 2: resolve prerequisites, one update     │
//!     │               per series                            │
//!     │                                                     │
//!     └─► Resequencer.move_item()                           │
//!             placement write                               │
//!             settle: re-read until the write is visible    │
//!             corrective writes, joined                     │
//!                     │                                     │
//!                     ▼                                     │
//!             EntityStore (create/update/delete/list)       │
//!                     │                                     │
//!                     ▼ invalidate                          │
//!             ReconciliationCache ─► EventBus ──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A move dropped where it started issues no writes.
//! - A failed placement aborts the move before any other write.
//! - Failed corrective writes are reported, never retried silently; the
//!   whole cache is invalidated and a degraded event is published.
//! - Unresolvable prerequisite codes are dropped and reported; they never
//!   fail a batch.
//!
//! ## Example
//!
//! ```ignore
//! use coursework::{CancelToken, CurriculumEngineBuilder, CurriculumOutline, MemoryStore};
//!
//! let engine = CurriculumEngineBuilder::new(MemoryStore::new()).build();
//! let outline = CurriculumOutline::from_json_str(&raw)?;
//! let report = engine
//!     .materialize(container.id, &outline, &CancelToken::new())
//!     .await;
//! println!("{} series, {} unresolved", report.series, report.unresolved.len());
//! ```

mod bus;
mod cache;
mod cancel;
mod codes;
mod config;
mod engine;
mod error;
mod generate;
mod materialize;
mod memory;
mod model;
mod outline;
mod resequence;
mod store;
mod template;

pub use bus::{CreationCounts, CurriculumEvent, EventBus};
pub use cache::{Cached, CollectionCache, ReconciliationCache, Settled};
pub use cancel::CancelToken;
pub use codes::{CodeResolutionMap, PrerequisiteIds, Resolution};
pub use config::{EngineConfig, MaterializeDefaults, SettlePolicy};
pub use engine::{CurriculumEngine, CurriculumEngineBuilder, Intent, IntentOutcome};
pub use error::{
    GenerationError, OutlineError, ResequenceError, StoreError, StoreResult, ValidationError,
};
pub use generate::{
    generate_modules, generate_outline, modules_schema, outline_schema, ContentGenerator,
    CourseBrief, GeneratedCourse, GeneratedImage, GeneratedModules, SeriesBrief,
};
pub use materialize::{BatchError, MaterializationReport, Materializer, UnresolvedReference};
pub use memory::MemoryStore;
pub use model::{
    Component, ComponentKind, ComponentPatch, Container, ContainerKind, ContainerPatch, Draft,
    Entity, EntityKind, NewComponent, NewContainer, NewPathway, NewSeries, NewUnit, Pathway,
    PathwayPatch, ProgressionRule, Sequenced, Series, SeriesPatch, Unit, UnitPatch,
    UnlockConditions,
};
pub use outline::{
    CurriculumOutline, DisciplineOutline, ModuleOutline, PeriodOutline, SuggestedComponent,
};
pub use resequence::{
    plan_corrections, Correction, FailedCorrection, MoveIntent, Placement, ReconcileOutcome,
    Resequencer,
};
pub use store::{
    check_patch, children_of, is_dense, sibling_order, CurriculumStore, EntityStore, SortKey,
};
pub use template::{ComponentTemplate, TemplatePalette};

// Re-export async_trait for store and generator implementors
pub use async_trait::async_trait;
