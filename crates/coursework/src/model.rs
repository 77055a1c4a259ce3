//! Curriculum records, their drafts and their partial updates.
//!
//! The hierarchy is Container → Pathway → Series → Unit → Component. Every
//! level below the container is [`Sequenced`]: it belongs to exactly one
//! parent and carries a 1-based `sequence_order` among that parent's children.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Discriminates the five record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Container,
    Pathway,
    Series,
    Unit,
    Component,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Container,
        EntityKind::Pathway,
        EntityKind::Series,
        EntityKind::Unit,
        EntityKind::Component,
    ];

    /// Collection name used by store backends.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Container => "containers",
            EntityKind::Pathway => "pathways",
            EntityKind::Series => "series",
            EntityKind::Unit => "units",
            EntityKind::Component => "components",
        }
    }

    /// Name of the field holding the parent id, `None` for containers.
    pub fn parent_field(self) -> Option<&'static str> {
        match self {
            EntityKind::Container => None,
            EntityKind::Pathway => Some("container_id"),
            EntityKind::Series => Some("pathway_id"),
            EntityKind::Unit => Some("series_id"),
            EntityKind::Component => Some("unit_id"),
        }
    }

    pub fn parent_kind(self) -> Option<EntityKind> {
        match self {
            EntityKind::Container => None,
            EntityKind::Pathway => Some(EntityKind::Container),
            EntityKind::Series => Some(EntityKind::Pathway),
            EntityKind::Unit => Some(EntityKind::Series),
            EntityKind::Component => Some(EntityKind::Unit),
        }
    }
}

/// A creation payload, checked before it is dispatched to a store.
pub trait Draft: Serialize + Clone + Debug + Send + Sync + 'static {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A persisted record.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    type Draft: Draft;
    type Patch: Serialize + Clone + Debug + Default + Send + Sync + 'static;

    fn id(&self) -> Uuid;
    fn created_date(&self) -> DateTime<Utc>;
}

/// A record ordered among the children of one parent.
pub trait Sequenced: Entity {
    fn parent_id(&self) -> Uuid;
    fn sequence_order(&self) -> u32;

    /// Patch that moves the record under `parent_id` (when given) at `sequence_order`.
    fn reposition(parent_id: Option<Uuid>, sequence_order: u32) -> Self::Patch;
}

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    #[default]
    Undergraduate,
    Postgraduate,
    Extension,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionRule {
    #[default]
    Free,
    Sequential,
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Media,
    Activity,
    Assessment,
    Attachment,
    #[default]
    Text,
}

impl ComponentKind {
    /// Lenient parse used for generated content; unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "media" | "midia" | "mídia" | "video" | "audio" => Some(ComponentKind::Media),
            "activity" | "atividade" | "exercise" => Some(ComponentKind::Activity),
            "assessment" | "avaliacao" | "avaliação" | "quiz" | "exam" => {
                Some(ComponentKind::Assessment)
            }
            "attachment" | "anexo" | "pdf" | "link" => Some(ComponentKind::Attachment),
            "text" | "texto" | "reading" => Some(ComponentKind::Text),
            _ => None,
        }
    }
}

/// Gate evaluated by learners' clients before a unit opens.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockConditions {
    pub requires_previous_completion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_score_previous: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_after_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_date: Option<DateTime<Utc>>,
}

impl UnlockConditions {
    pub fn is_empty(&self) -> bool {
        !self.requires_previous_completion
            && self.minimum_score_previous.is_none()
            && self.unlock_after_days.is_none()
            && self.unlock_date.is_none()
    }

    fn validate(&self, kind: EntityKind, rule: ProgressionRule) -> Result<(), ValidationError> {
        if let Some(score) = self.minimum_score_previous {
            if score > 100 {
                return Err(ValidationError::new(
                    kind,
                    "unlock_conditions",
                    format!("minimum score {score} exceeds 100"),
                ));
            }
        }
        if rule == ProgressionRule::Conditional && self.is_empty() {
            return Err(ValidationError::new(
                kind,
                "unlock_conditions",
                "conditional progression needs at least one unlock condition",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

fn require_name(kind: EntityKind, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new(kind, "name", "must not be empty"));
    }
    Ok(())
}

fn require_parent(kind: EntityKind, parent: Uuid) -> Result<(), ValidationError> {
    if parent.is_nil() {
        let field = kind.parent_field().unwrap_or("parent_id");
        return Err(ValidationError::new(kind, field, "parent id is required"));
    }
    Ok(())
}

fn require_order(kind: EntityKind, order: u32) -> Result<(), ValidationError> {
    if order == 0 {
        return Err(ValidationError::new(kind, "sequence_order", "must be >= 1"));
    }
    Ok(())
}

// ============================================================================
// Container
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    #[serde(rename = "type", default)]
    pub kind: ContainerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContainer {
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: ContainerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Draft for NewContainer {
    fn validate(&self) -> Result<(), ValidationError> {
        require_name(EntityKind::Container, &self.name)?;
        if self.code.trim().is_empty() {
            return Err(ValidationError::new(
                EntityKind::Container,
                "code",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContainerKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Entity for Container {
    const KIND: EntityKind = EntityKind::Container;
    type Draft = NewContainer;
    type Patch = ContainerPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

// ============================================================================
// Pathway
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pathway {
    pub id: Uuid,
    pub container_id: Uuid,
    pub name: String,
    pub sequence_order: u32,
    pub duration_months: u32,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPathway {
    pub container_id: Uuid,
    pub name: String,
    pub sequence_order: u32,
    pub duration_months: u32,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Draft for NewPathway {
    fn validate(&self) -> Result<(), ValidationError> {
        require_parent(EntityKind::Pathway, self.container_id)?;
        require_name(EntityKind::Pathway, &self.name)?;
        require_order(EntityKind::Pathway, self.sequence_order)?;
        if self.duration_months == 0 {
            return Err(ValidationError::new(
                EntityKind::Pathway,
                "duration_months",
                "must be >= 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathwayPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity for Pathway {
    const KIND: EntityKind = EntityKind::Pathway;
    type Draft = NewPathway;
    type Patch = PathwayPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

impl Sequenced for Pathway {
    fn parent_id(&self) -> Uuid {
        self.container_id
    }

    fn sequence_order(&self) -> u32 {
        self.sequence_order
    }

    fn reposition(parent_id: Option<Uuid>, sequence_order: u32) -> PathwayPatch {
        PathwayPatch {
            container_id: parent_id,
            sequence_order: Some(sequence_order),
            ..Default::default()
        }
    }
}

// ============================================================================
// Series
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: Uuid,
    pub pathway_id: Uuid,
    pub name: String,
    pub code: String,
    pub sequence_order: u32,
    #[serde(default)]
    pub prerequisite_ids: Vec<Uuid>,
    pub workload_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syllabus: Option<String>,
    #[serde(default = "default_true")]
    pub offerable: bool,
    #[serde(default = "default_true")]
    pub reusable: bool,
    #[serde(default)]
    pub standalone: bool,
    pub max_grade: f64,
    pub passing_grade: f64,
    pub minimum_attendance: u8,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSeries {
    pub pathway_id: Uuid,
    pub name: String,
    pub code: String,
    pub sequence_order: u32,
    pub prerequisite_ids: Vec<Uuid>,
    pub workload_hours: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syllabus: Option<String>,
    pub offerable: bool,
    pub reusable: bool,
    pub standalone: bool,
    pub max_grade: f64,
    pub passing_grade: f64,
    pub minimum_attendance: u8,
}

impl Draft for NewSeries {
    fn validate(&self) -> Result<(), ValidationError> {
        require_parent(EntityKind::Series, self.pathway_id)?;
        require_name(EntityKind::Series, &self.name)?;
        require_order(EntityKind::Series, self.sequence_order)?;
        if self.code.trim().is_empty() {
            return Err(ValidationError::new(
                EntityKind::Series,
                "code",
                "must not be empty",
            ));
        }
        if self.passing_grade > self.max_grade || self.passing_grade < 0.0 {
            return Err(ValidationError::new(
                EntityKind::Series,
                "passing_grade",
                format!(
                    "must lie within 0..={}, got {}",
                    self.max_grade, self.passing_grade
                ),
            ));
        }
        if self.minimum_attendance > 100 {
            return Err(ValidationError::new(
                EntityKind::Series,
                "minimum_attendance",
                "is a percentage and must not exceed 100",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathway_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisite_ids: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syllabus: Option<String>,
}

impl SeriesPatch {
    pub fn prerequisites(ids: Vec<Uuid>) -> Self {
        Self {
            prerequisite_ids: Some(ids),
            ..Default::default()
        }
    }
}

impl Entity for Series {
    const KIND: EntityKind = EntityKind::Series;
    type Draft = NewSeries;
    type Patch = SeriesPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

impl Sequenced for Series {
    fn parent_id(&self) -> Uuid {
        self.pathway_id
    }

    fn sequence_order(&self) -> u32 {
        self.sequence_order
    }

    fn reposition(parent_id: Option<Uuid>, sequence_order: u32) -> SeriesPatch {
        SeriesPatch {
            pathway_id: parent_id,
            sequence_order: Some(sequence_order),
            ..Default::default()
        }
    }
}

// ============================================================================
// Unit
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub series_id: Uuid,
    pub name: String,
    pub sequence_order: u32,
    #[serde(default)]
    pub progression_rule: ProgressionRule,
    #[serde(default)]
    pub unlock_conditions: UnlockConditions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUnit {
    pub series_id: Uuid,
    pub name: String,
    pub sequence_order: u32,
    pub progression_rule: ProgressionRule,
    pub unlock_conditions: UnlockConditions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub objectives: Vec<String>,
}

impl Draft for NewUnit {
    fn validate(&self) -> Result<(), ValidationError> {
        require_parent(EntityKind::Unit, self.series_id)?;
        require_name(EntityKind::Unit, &self.name)?;
        require_order(EntityKind::Unit, self.sequence_order)?;
        self.unlock_conditions
            .validate(EntityKind::Unit, self.progression_rule)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progression_rule: Option<ProgressionRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_conditions: Option<UnlockConditions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity for Unit {
    const KIND: EntityKind = EntityKind::Unit;
    type Draft = NewUnit;
    type Patch = UnitPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

impl Sequenced for Unit {
    fn parent_id(&self) -> Uuid {
        self.series_id
    }

    fn sequence_order(&self) -> u32 {
        self.sequence_order
    }

    fn reposition(parent_id: Option<Uuid>, sequence_order: u32) -> UnitPatch {
        UnitPatch {
            series_id: parent_id,
            sequence_order: Some(sequence_order),
            ..Default::default()
        }
    }
}

// ============================================================================
// Component
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ComponentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub sequence_order: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub progression_rule: ProgressionRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComponent {
    pub unit_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub sequence_order: u32,
    pub description: String,
    pub required: bool,
    pub progression_rule: ProgressionRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub learning_objectives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    pub weight: f64,
}

impl Draft for NewComponent {
    fn validate(&self) -> Result<(), ValidationError> {
        require_parent(EntityKind::Component, self.unit_id)?;
        require_name(EntityKind::Component, &self.name)?;
        require_order(EntityKind::Component, self.sequence_order)?;
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            return Err(ValidationError::new(
                EntityKind::Component,
                "weight",
                "must be a non-negative number",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progression_rule: Option<ProgressionRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_objectives: Option<Vec<String>>,
}

impl Entity for Component {
    const KIND: EntityKind = EntityKind::Component;
    type Draft = NewComponent;
    type Patch = ComponentPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

impl Sequenced for Component {
    fn parent_id(&self) -> Uuid {
        self.unit_id
    }

    fn sequence_order(&self) -> u32 {
        self.sequence_order
    }

    fn reposition(parent_id: Option<Uuid>, sequence_order: u32) -> ComponentPatch {
        ComponentPatch {
            unit_id: parent_id,
            sequence_order: Some(sequence_order),
            ..Default::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}
