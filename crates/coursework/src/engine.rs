//! Engine facade: one store, one cache, one bus, every operation.

use crate::bus::EventBus;
use crate::cache::{Cached, ReconciliationCache};
use crate::cancel::CancelToken;
use crate::config::{EngineConfig, MaterializeDefaults, SettlePolicy};
use crate::error::{ResequenceError, StoreError};
use crate::generate::GeneratedCourse;
use crate::materialize::{MaterializationReport, Materializer};
use crate::model::{Component, Container, Draft, Pathway, Sequenced, Series, Unit};
use crate::outline::{CurriculumOutline, ModuleOutline};
use crate::resequence::{order_at, MoveIntent, ReconcileOutcome, Resequencer};
use crate::store::{children_of, CurriculumStore, EntityStore};
use crate::template::TemplatePalette;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// A request originating from the authoring view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    MovePathway(MoveIntent),
    MoveSeries(MoveIntent),
    MoveUnit(MoveIntent),
    MoveComponent(MoveIntent),
    /// Drop of a palette template into a unit at `index`.
    InsertTemplate {
        template_id: String,
        unit_id: Uuid,
        index: usize,
    },
}

/// Result of [`CurriculumEngine::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Moved(ReconcileOutcome),
    Inserted {
        component: Component,
        outcome: ReconcileOutcome,
    },
}

impl IntentOutcome {
    pub fn reconcile(&self) -> &ReconcileOutcome {
        match self {
            IntentOutcome::Moved(outcome) => outcome,
            IntentOutcome::Inserted { outcome, .. } => outcome,
        }
    }
}

pub struct CurriculumEngineBuilder<S> {
    store: Arc<S>,
    config: EngineConfig,
    bus: Option<EventBus>,
}

impl<S: CurriculumStore> CurriculumEngineBuilder<S> {
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            bus: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.config.settle = settle;
        self
    }

    pub fn with_defaults(mut self, defaults: MaterializeDefaults) -> Self {
        self.config.defaults = defaults;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Publish on an existing bus instead of a new one.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> CurriculumEngine<S> {
        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::with_capacity(self.config.event_capacity));
        let cache = Arc::new(ReconciliationCache::new(bus.clone()));
        debug!(settle = ?self.config.settle, "curriculum engine built");
        CurriculumEngine {
            store: self.store,
            cache,
            bus,
            config: self.config,
            palette: TemplatePalette::default(),
            gate: Arc::new(Mutex::new(())),
        }
    }
}

pub struct CurriculumEngine<S> {
    store: Arc<S>,
    cache: Arc<ReconciliationCache>,
    bus: EventBus,
    config: EngineConfig,
    palette: TemplatePalette,
    gate: Arc<Mutex<()>>,
}

impl<S> Clone for CurriculumEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            bus: self.bus.clone(),
            config: self.config.clone(),
            palette: self.palette,
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<S: CurriculumStore> CurriculumEngine<S> {
    pub fn builder(store: S) -> CurriculumEngineBuilder<S> {
        CurriculumEngineBuilder::new(store)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ReconciliationCache> {
        &self.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn palette(&self) -> &TemplatePalette {
        &self.palette
    }

    pub fn materializer(&self) -> Materializer<S> {
        Materializer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            self.bus.clone(),
            self.config.defaults.clone(),
        )
    }

    /// Resequencer for `E`. All resequencers of one engine run one at a time.
    pub fn resequencer<E>(&self) -> Resequencer<S, E>
    where
        E: Sequenced + Cached,
        S: EntityStore<E>,
    {
        Resequencer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            self.bus.clone(),
            self.config.settle,
        )
        .with_gate(Arc::clone(&self.gate))
    }

    /// Cached records of `E`.
    pub async fn read<E>(&self) -> Result<Arc<Vec<E>>, StoreError>
    where
        E: Cached,
        S: EntityStore<E>,
    {
        self.cache.collection::<E>().read(self.store.as_ref()).await
    }

    /// Cached children of `parent_id` in display order.
    pub async fn children<E>(&self, parent_id: Uuid) -> Result<Vec<E>, StoreError>
    where
        E: Sequenced + Cached,
        S: EntityStore<E>,
    {
        let records = self.read::<E>().await?;
        Ok(children_of(&records, parent_id))
    }

    /// Validates and creates one record, invalidating its collection.
    pub async fn create<E>(&self, draft: E::Draft) -> Result<E, StoreError>
    where
        E: Cached,
        S: EntityStore<E>,
    {
        draft.validate()?;
        let created = EntityStore::<E>::create(self.store.as_ref(), draft).await?;
        self.cache.invalidate(E::KIND);
        Ok(created)
    }

    pub async fn materialize(
        &self,
        container_id: Uuid,
        outline: &CurriculumOutline,
        cancel: &CancelToken,
    ) -> MaterializationReport {
        self.materializer().run(container_id, outline, cancel).await
    }

    pub async fn materialize_modules(
        &self,
        series_id: Uuid,
        modules: &[ModuleOutline],
        cancel: &CancelToken,
    ) -> MaterializationReport {
        self.materializer()
            .run_modules(series_id, modules, cancel)
            .await
    }

    /// Creates the container for a generated course and materializes its
    /// structure under it.
    pub async fn import_course(
        &self,
        name: &str,
        year: i32,
        course: &GeneratedCourse,
        cancel: &CancelToken,
    ) -> Result<(Container, MaterializationReport), StoreError> {
        let container: Container = self.create(course.container_draft(name, year)).await?;
        info!(container_id = %container.id, code = %container.code, "container created");
        let report = self
            .materialize(container.id, &course.curriculum_structure, cancel)
            .await;
        Ok((container, report))
    }

    pub async fn move_item<E>(
        &self,
        intent: MoveIntent,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome, ResequenceError>
    where
        E: Sequenced + Cached,
        S: EntityStore<E>,
    {
        self.resequencer::<E>().move_item(intent, cancel).await
    }

    /// Inserts a component built from a palette template at `index` in `unit_id`.
    pub async fn insert_template(
        &self,
        template_id: &str,
        unit_id: Uuid,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<(Component, ReconcileOutcome), ResequenceError> {
        let template = self
            .palette
            .find(template_id)
            .ok_or_else(|| ResequenceError::UnknownTemplate(template_id.to_owned()))?;
        let draft = template.instantiate(unit_id, order_at(index));
        self.resequencer::<Component>()
            .insert(draft, index, cancel)
            .await
    }

    pub async fn remove<E>(
        &self,
        item_id: Uuid,
        parent_id: Uuid,
    ) -> Result<ReconcileOutcome, ResequenceError>
    where
        E: Sequenced + Cached,
        S: EntityStore<E>,
    {
        self.resequencer::<E>().remove(item_id, parent_id).await
    }

    pub async fn close_gaps<E>(&self, parent_id: Uuid) -> Result<ReconcileOutcome, ResequenceError>
    where
        E: Sequenced + Cached,
        S: EntityStore<E>,
    {
        self.resequencer::<E>().close_gaps(parent_id).await
    }

    pub async fn dispatch(
        &self,
        intent: Intent,
        cancel: &CancelToken,
    ) -> Result<IntentOutcome, ResequenceError> {
        debug!(?intent, "dispatch");
        let outcome = match intent {
            Intent::MovePathway(intent) => self.move_item::<Pathway>(intent, cancel).await?,
            Intent::MoveSeries(intent) => self.move_item::<Series>(intent, cancel).await?,
            Intent::MoveUnit(intent) => self.move_item::<Unit>(intent, cancel).await?,
            Intent::MoveComponent(intent) => self.move_item::<Component>(intent, cancel).await?,
            Intent::InsertTemplate {
                template_id,
                unit_id,
                index,
            } => {
                let (component, outcome) = self
                    .insert_template(&template_id, unit_id, index, cancel)
                    .await?;
                return Ok(IntentOutcome::Inserted { component, outcome });
            }
        };
        Ok(IntentOutcome::Moved(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CurriculumEvent;
    use crate::memory::MemoryStore;
    use crate::model::{NewUnit, ProgressionRule, UnlockConditions};
    use crate::store::is_dense;

    fn engine() -> CurriculumEngine<MemoryStore> {
        CurriculumEngineBuilder::new(MemoryStore::new())
            .with_settle_policy(SettlePolicy::immediate())
            .build()
    }

    async fn unit_with_components(engine: &CurriculumEngine<MemoryStore>, n: usize) -> Uuid {
        let unit: Unit = engine
            .create(NewUnit {
                series_id: Uuid::new_v4(),
                name: "Unit".into(),
                sequence_order: 1,
                progression_rule: ProgressionRule::Free,
                unlock_conditions: UnlockConditions::default(),
                estimated_hours: None,
                description: None,
                objectives: Vec::new(),
            })
            .await
            .unwrap();
        let cancel = CancelToken::new();
        for index in 0..n {
            engine
                .insert_template("text", unit.id, index, &cancel)
                .await
                .unwrap();
        }
        unit.id
    }

    #[tokio::test]
    async fn template_insertion_shifts_later_siblings() {
        let engine = engine();
        let unit_id = unit_with_components(&engine, 3).await;

        let outcome = engine
            .dispatch(
                Intent::InsertTemplate {
                    template_id: "video".into(),
                    unit_id,
                    index: 1,
                },
                &CancelToken::new(),
            )
            .await
            .unwrap();
        let IntentOutcome::Inserted { component, outcome } = outcome else {
            panic!("expected an insertion");
        };
        assert_eq!(outcome.corrections.len(), 2);

        let children = engine.children::<Component>(unit_id).await.unwrap();
        assert_eq!(children.len(), 4);
        assert_eq!(children[1].id, component.id);
        assert!(is_dense(&children, unit_id));
    }

    #[tokio::test]
    async fn unknown_template_is_rejected() {
        let engine = engine();
        let err = engine
            .insert_template("hologram", Uuid::new_v4(), 0, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResequenceError::UnknownTemplate(id) if id == "hologram"));
    }

    #[tokio::test]
    async fn dispatch_publishes_placement_and_reconciliation() {
        let engine = engine();
        let unit_id = unit_with_components(&engine, 3).await;
        let first = engine.children::<Component>(unit_id).await.unwrap()[0].id;
        let mut rx = engine.bus().subscribe();

        engine
            .dispatch(
                Intent::MoveComponent(MoveIntent::within(unit_id, first, 0, 2)),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let mut placed = false;
        let mut reconciled = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                CurriculumEvent::ItemPlaced { item_id, .. } => placed |= item_id == first,
                CurriculumEvent::Reconciled { corrections, .. } => reconciled |= corrections == 2,
                _ => {}
            }
        }
        assert!(placed && reconciled);
    }
}
