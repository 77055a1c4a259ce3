//! Structure Materializer: specification tree → persisted hierarchy.
//!
//! Two passes. Pass 1 creates every pathway, series, unit and component in
//! input order, recording `code → series id` as series come into existence.
//! Pass 2 resolves each discipline's prerequisite codes through that map and
//! issues at most one update per series. Prerequisites may point forward in
//! the tree, which is why resolution cannot happen during creation.
//!
//! The batch is best-effort: a failed write is recorded with its position in
//! the tree and the run moves on to the next sibling. Creation is sequential
//! so that `sequence_order` follows input position and every error can be
//! attributed to one sibling.

use crate::bus::{CreationCounts, CurriculumEvent, EventBus};
use crate::cache::ReconciliationCache;
use crate::cancel::CancelToken;
use crate::codes::CodeResolutionMap;
use crate::config::MaterializeDefaults;
use crate::error::StoreResult;
use crate::model::{
    Component, ComponentKind, Draft, Entity, EntityKind, NewComponent, NewPathway, NewSeries,
    NewUnit, Pathway, ProgressionRule, Series, SeriesPatch, Unit, UnlockConditions,
};
use crate::outline::{CurriculumOutline, DisciplineOutline, ModuleOutline};
use crate::store::{CurriculumStore, EntityStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A write that failed, with the tree position it belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub context: String,
    pub message: String,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

/// A prerequisite code that matched no created series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub discipline_code: String,
    pub missing_code: String,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prerequisite {} of {} does not match any discipline",
            self.missing_code, self.discipline_code
        )
    }
}

/// Summary of one run. Always produced, even when writes failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializationReport {
    pub pathways: usize,
    pub series: usize,
    pub units: usize,
    pub components: usize,
    /// Prerequisite ids written across all series.
    pub prerequisite_links: usize,
    pub objectives: usize,
    pub assessment_types: usize,
    pub errors: Vec<BatchError>,
    pub unresolved: Vec<UnresolvedReference>,
    /// Codes declared by more than one discipline; the first declaration wins.
    pub duplicate_codes: Vec<String>,
    pub cancelled: bool,
}

impl MaterializationReport {
    pub fn counts(&self) -> CreationCounts {
        CreationCounts {
            pathways: self.pathways,
            series: self.series,
            units: self.units,
            components: self.components,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.unresolved.is_empty() && !self.cancelled
    }

    fn fail(&mut self, context: String, err: impl fmt::Display) {
        warn!(%context, error = %err, "creation failed, continuing with next sibling");
        self.errors.push(BatchError {
            context,
            message: err.to_string(),
        });
    }
}

struct CreatedSeries<'a> {
    id: Uuid,
    code: String,
    discipline: &'a DisciplineOutline,
}

pub struct Materializer<S> {
    store: Arc<S>,
    cache: Arc<ReconciliationCache>,
    bus: EventBus,
    defaults: MaterializeDefaults,
}

impl<S> Clone for Materializer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            bus: self.bus.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

impl<S: CurriculumStore> Materializer<S> {
    pub fn new(
        store: Arc<S>,
        cache: Arc<ReconciliationCache>,
        bus: EventBus,
        defaults: MaterializeDefaults,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            defaults,
        }
    }

    async fn create<E: Entity>(&self, draft: E::Draft) -> StoreResult<E>
    where
        S: EntityStore<E>,
    {
        draft.validate()?;
        let created = EntityStore::<E>::create(self.store.as_ref(), draft).await?;
        debug!(kind = ?E::KIND, id = %created.id(), "created");
        Ok(created)
    }

    /// Materializes `outline` under `container_id`.
    pub async fn run(
        &self,
        container_id: Uuid,
        outline: &CurriculumOutline,
        cancel: &CancelToken,
    ) -> MaterializationReport {
        let span = info_span!("materialize", %container_id, periods = outline.periods.len());
        async {
            let mut report = MaterializationReport::default();

            let mut codes = CodeResolutionMap::new();
            let created = self
                .create_tree(container_id, outline, &mut codes, cancel, &mut report)
                .await;

            if report.cancelled {
                info!("cancelled during creation, prerequisite resolution skipped");
            } else {
                self.resolve_prerequisites(&created, &codes, cancel, &mut report)
                    .await;
            }

            for kind in [
                EntityKind::Pathway,
                EntityKind::Series,
                EntityKind::Unit,
                EntityKind::Component,
            ] {
                self.cache.invalidate(kind);
            }

            info!(
                pathways = report.pathways,
                series = report.series,
                units = report.units,
                components = report.components,
                prerequisite_links = report.prerequisite_links,
                errors = report.errors.len(),
                unresolved = report.unresolved.len(),
                cancelled = report.cancelled,
                "materialization finished"
            );
            self.bus.emit(CurriculumEvent::StructureMaterialized {
                container_id,
                counts: report.counts(),
                errors: report.errors.len(),
                cancelled: report.cancelled,
            });
            report
        }
        .instrument(span)
        .await
    }

    /// Pass 1.
    async fn create_tree<'a>(
        &self,
        container_id: Uuid,
        outline: &'a CurriculumOutline,
        codes: &mut CodeResolutionMap,
        cancel: &CancelToken,
        report: &mut MaterializationReport,
    ) -> Vec<CreatedSeries<'a>> {
        let mut created = Vec::new();

        'periods: for (p, period) in outline.periods.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let position = p + 1;
            let pathway_draft = NewPathway {
                container_id,
                name: period.name.trim().to_owned(),
                sequence_order: position as u32,
                duration_months: period
                    .duration_months
                    .filter(|months| *months > 0)
                    .unwrap_or(self.defaults.pathway_duration_months),
                required: true,
                description: Some(period.description_text()),
            };
            let pathway: Pathway = match self.create(pathway_draft).await {
                Ok(pathway) => pathway,
                Err(err) => {
                    // Its disciplines have no parent to live under.
                    report.fail(format!("period {position} {:?}", period.name), err);
                    continue;
                }
            };
            report.pathways += 1;
            report.objectives += period.objectives.len();

            for (d, discipline) in period.disciplines.iter().enumerate() {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'periods;
                }
                let code = discipline.effective_code(position, d);
                let context = format!("period {position}, discipline {:?}", discipline.name);
                let workload = discipline
                    .workload_hours
                    .filter(|hours| *hours > 0)
                    .unwrap_or(self.defaults.series_workload_hours);

                let series_draft = NewSeries {
                    pathway_id: pathway.id,
                    name: discipline.name.trim().to_owned(),
                    code: code.clone(),
                    sequence_order: (d + 1) as u32,
                    prerequisite_ids: Vec::new(),
                    workload_hours: workload,
                    syllabus: discipline.syllabus_text(),
                    offerable: true,
                    reusable: true,
                    standalone: false,
                    max_grade: self.defaults.max_grade,
                    passing_grade: self.defaults.passing_grade,
                    minimum_attendance: self.defaults.minimum_attendance,
                };
                let series: Series = match self.create(series_draft).await {
                    Ok(series) => series,
                    Err(err) => {
                        report.fail(context, err);
                        continue;
                    }
                };
                report.series += 1;
                report.objectives += discipline.objectives.len();
                report.assessment_types += discipline.assessment_types.len();

                if codes.register(&code, series.id).is_err() {
                    warn!(%code, "discipline code declared twice, keeping the first");
                    report.duplicate_codes.push(code.clone());
                }
                created.push(CreatedSeries {
                    id: series.id,
                    code,
                    discipline,
                });

                let modules = discipline.modules.len().max(1) as u32;
                let fallback_hours = workload.div_ceil(modules);
                self.create_units(
                    series.id,
                    &context,
                    &discipline.modules,
                    fallback_hours,
                    cancel,
                    report,
                )
                .await;
                if report.cancelled {
                    break 'periods;
                }
            }
        }

        created
    }

    /// Units of one series and the components suggested for each.
    async fn create_units(
        &self,
        series_id: Uuid,
        context: &str,
        modules: &[ModuleOutline],
        fallback_hours: u32,
        cancel: &CancelToken,
        report: &mut MaterializationReport,
    ) {
        for (m, module) in modules.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            let unit_context = format!("{context}, module {:?}", module.name);
            let unit_draft = NewUnit {
                series_id,
                name: module.name.trim().to_owned(),
                sequence_order: (m + 1) as u32,
                progression_rule: ProgressionRule::Free,
                unlock_conditions: UnlockConditions::default(),
                estimated_hours: Some(
                    module
                        .duration_hours
                        .filter(|hours| *hours > 0)
                        .unwrap_or(fallback_hours),
                ),
                description: module.description_text(),
                objectives: module.objectives.clone(),
            };
            let unit: Unit = match self.create(unit_draft).await {
                Ok(unit) => unit,
                Err(err) => {
                    report.fail(unit_context, err);
                    continue;
                }
            };
            report.units += 1;
            report.objectives += module.objectives.len();

            for (c, suggestion) in module.suggested_components.iter().enumerate() {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    return;
                }
                let component_draft = NewComponent {
                    unit_id: unit.id,
                    name: suggestion.name.trim().to_owned(),
                    kind: suggestion
                        .kind
                        .as_deref()
                        .and_then(ComponentKind::from_label)
                        .unwrap_or(self.defaults.component_kind),
                    content_type: None,
                    sequence_order: (c + 1) as u32,
                    description: suggestion.description.clone().unwrap_or_default(),
                    required: true,
                    progression_rule: ProgressionRule::Sequential,
                    duration_minutes: None,
                    learning_objectives: Vec::new(),
                    content_url: None,
                    content_text: None,
                    weight: 1.0,
                };
                match self.create::<Component>(component_draft).await {
                    Ok(_) => report.components += 1,
                    Err(err) => report.fail(
                        format!("{unit_context}, component {:?}", suggestion.name),
                        err,
                    ),
                }
            }
        }
    }

    /// Pass 2.
    async fn resolve_prerequisites(
        &self,
        created: &[CreatedSeries<'_>],
        codes: &CodeResolutionMap,
        cancel: &CancelToken,
        report: &mut MaterializationReport,
    ) {
        for series in created {
            if series.discipline.prerequisites.is_empty() {
                continue;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            let resolution = codes.resolve(&series.discipline.prerequisites, Some(series.id));
            for missing in resolution.unresolved {
                warn!(discipline = %series.code, %missing, "unresolved prerequisite dropped");
                report.unresolved.push(UnresolvedReference {
                    discipline_code: series.code.clone(),
                    missing_code: missing,
                });
            }
            for own in &resolution.self_references {
                debug!(discipline = %series.code, code = %own, "self prerequisite ignored");
            }
            if resolution.ids.is_empty() {
                continue;
            }

            let links = resolution.ids.len();
            let patch = SeriesPatch::prerequisites(resolution.ids.into_vec());
            match EntityStore::<Series>::update(self.store.as_ref(), series.id, patch).await {
                Ok(_) => report.prerequisite_links += links,
                Err(err) => report.fail(
                    format!("prerequisites of discipline {:?}", series.code),
                    err,
                ),
            }
        }
    }

    /// Creates units (and their suggested components) under an existing series.
    pub async fn run_modules(
        &self,
        series_id: Uuid,
        modules: &[ModuleOutline],
        cancel: &CancelToken,
    ) -> MaterializationReport {
        let span = info_span!("materialize_modules", %series_id, modules = modules.len());
        async {
            let mut report = MaterializationReport::default();
            self.create_units(
                series_id,
                &format!("series {series_id}"),
                modules,
                self.defaults.unit_duration_hours,
                cancel,
                &mut report,
            )
            .await;

            self.cache.invalidate(EntityKind::Unit);
            self.cache.invalidate(EntityKind::Component);

            info!(
                units = report.units,
                components = report.components,
                errors = report.errors.len(),
                cancelled = report.cancelled,
                "module materialization finished"
            );
            self.bus.emit(CurriculumEvent::ModulesMaterialized {
                series_id,
                counts: report.counts(),
                errors: report.errors.len(),
                cancelled: report.cancelled,
            });
            report
        }
        .instrument(span)
        .await
    }
}
