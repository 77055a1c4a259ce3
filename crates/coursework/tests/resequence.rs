use coursework::{
    CancelToken, Component, CurriculumEngine, CurriculumEngineBuilder, CurriculumEvent,
    EntityStore, MemoryStore, MoveIntent, Pathway, ResequenceError, SettlePolicy, Unit,
};
use coursework_testing::{assert_dense, fixtures, orders, FlakyStore, Op};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

type Engine = CurriculumEngine<FlakyStore<MemoryStore>>;

fn engine_with(settle: SettlePolicy) -> (Arc<FlakyStore<MemoryStore>>, Engine) {
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let engine = CurriculumEngineBuilder::from_arc(Arc::clone(&store))
        .with_settle_policy(settle)
        .build();
    (store, engine)
}

fn engine() -> (Arc<FlakyStore<MemoryStore>>, Engine) {
    engine_with(SettlePolicy::immediate())
}

async fn units(store: &FlakyStore<MemoryStore>) -> Vec<Unit> {
    EntityStore::<Unit>::list(store.inner(), None).await.unwrap()
}

fn names(records: &[Unit], parent_id: Uuid) -> Vec<(String, u32)> {
    orders(records, parent_id, |unit: &Unit| unit.name.as_str())
}

fn pairs(expected: &[(&str, u32)]) -> Vec<(String, u32)> {
    expected
        .iter()
        .map(|(name, order)| (name.to_string(), *order))
        .collect()
}

#[tokio::test]
async fn drop_in_place_issues_no_writes() {
    let (store, engine) = engine();
    let series_id = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), series_id, &["a", "b", "c"])
        .await
        .unwrap();

    let outcome = engine
        .move_item::<Unit>(
            MoveIntent::within(series_id, seeded[1].id, 1, 1),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn cross_parent_move_renumbers_both_parents() {
    let (store, engine) = engine();
    let series_a = Uuid::new_v4();
    let series_b = Uuid::new_v4();
    let a = fixtures::seed_units(store.inner(), series_a, &["x", "y", "z"])
        .await
        .unwrap();
    fixtures::seed_units(store.inner(), series_b, &["w"])
        .await
        .unwrap();

    let outcome = engine
        .move_item::<Unit>(
            MoveIntent {
                item_id: a[1].id,
                source_parent_id: series_a,
                source_index: 1,
                destination_parent_id: series_b,
                destination_index: 0,
            },
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert!(!outcome.is_degraded());
    // y placed, then z and w renumbered.
    assert_eq!(outcome.writes(), 3);

    let all = units(&store).await;
    assert_eq!(names(&all, series_a), pairs(&[("x", 1), ("z", 2)]));
    assert_eq!(names(&all, series_b), pairs(&[("y", 1), ("w", 2)]));
}

#[tokio::test]
async fn random_operations_keep_every_parent_dense() {
    let (store, engine) = engine();
    let parents = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    for parent in parents {
        fixtures::seed_units(store.inner(), parent, &["u1", "u2", "u3", "u4"])
            .await
            .unwrap();
    }
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let cancel = CancelToken::new();

    for step in 0..60 {
        let all = units(&store).await;
        let source = parents[rng.usize(..parents.len())];
        let siblings = coursework::children_of(&all, source);
        let roll = rng.u8(..10);

        if siblings.is_empty() || roll < 2 {
            let index = rng.usize(..=siblings.len());
            let draft = fixtures::unit_draft(source, &format!("new{step}"), index as u32 + 1);
            engine
                .resequencer::<Unit>()
                .insert(draft, index, &cancel)
                .await
                .unwrap();
        } else if roll < 3 {
            let victim = &siblings[rng.usize(..siblings.len())];
            engine.remove::<Unit>(victim.id, source).await.unwrap();
        } else {
            let from = rng.usize(..siblings.len());
            let destination = parents[rng.usize(..parents.len())];
            let destination_len = coursework::children_of(&all, destination).len();
            let to = if destination == source {
                rng.usize(..siblings.len())
            } else {
                rng.usize(..=destination_len)
            };
            engine
                .move_item::<Unit>(
                    MoveIntent {
                        item_id: siblings[from].id,
                        source_parent_id: source,
                        source_index: from,
                        destination_parent_id: destination,
                        destination_index: to,
                    },
                    &cancel,
                )
                .await
                .unwrap();
        }

        let all = units(&store).await;
        for parent in parents {
            assert_dense(&all, parent);
        }
    }
}

#[tokio::test]
async fn failed_placement_aborts_without_other_writes() {
    let (store, engine) = engine();
    let series_id = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), series_id, &["a", "b", "c"])
        .await
        .unwrap();
    store.fail_updates_of(seeded[2].id);

    let err = engine
        .move_item::<Unit>(
            MoveIntent::within(series_id, seeded[2].id, 2, 0),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResequenceError::Placement { item_id, .. } if item_id == seeded[2].id));
    assert_eq!(store.writes(), 1);
    let all = units(&store).await;
    assert_eq!(names(&all, series_id), pairs(&[("a", 1), ("b", 2), ("c", 3)]));
}

#[tokio::test]
async fn failed_corrective_write_degrades_and_invalidates() {
    let (store, engine) = engine();
    let series_id = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), series_id, &["a", "b", "c"])
        .await
        .unwrap();
    // Prime every collection so the forced invalidation is observable.
    engine.read::<Pathway>().await.unwrap();
    engine.read::<Component>().await.unwrap();
    store.fail_updates_of(seeded[1].id);
    let mut events = engine.bus().subscribe();

    let outcome = engine
        .move_item::<Unit>(
            MoveIntent::within(series_id, seeded[2].id, 2, 0),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.is_degraded());
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].correction.id, seeded[1].id);
    assert_eq!(outcome.corrections.len(), 1);
    assert!(!engine.cache().collection::<Pathway>().is_fresh());
    assert!(!engine.cache().collection::<Component>().is_fresh());

    let mut degraded = None;
    while let Ok(event) = events.try_recv() {
        if let CurriculumEvent::ReconciliationDegraded { failed, parent_ids, .. } = event {
            degraded = Some((failed, parent_ids));
        }
    }
    assert_eq!(degraded, Some((1, vec![series_id])));

    // c took the top, a moved down, b kept its old order.
    let all = units(&store).await;
    let order_of = |name: &str| {
        all.iter()
            .find(|unit| unit.name == name)
            .map(|unit| unit.sequence_order)
    };
    assert_eq!(
        (order_of("c"), order_of("a"), order_of("b")),
        (Some(1), Some(2), Some(2))
    );

    // A later reconciliation heals the parent.
    store.clear_faults();
    engine.close_gaps::<Unit>(series_id).await.unwrap();
    assert_dense(&units(&store).await, series_id);
}

#[tokio::test]
async fn settling_waits_out_stale_reads() {
    let (store, engine) = engine_with(SettlePolicy {
        max_attempts: 4,
        interval: Duration::from_millis(1),
    });
    let series_id = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), series_id, &["a", "b", "c"])
        .await
        .unwrap();
    store.set_stale_reads(2);

    let outcome = engine
        .move_item::<Unit>(
            MoveIntent::within(series_id, seeded[0].id, 0, 2),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(!outcome.stale);
    assert_eq!(outcome.settle_attempts, 3);
    store.set_stale_reads(0);
    let all = units(&store).await;
    assert_eq!(names(&all, series_id), pairs(&[("b", 1), ("c", 2), ("a", 3)]));
}

#[tokio::test]
async fn exhausted_settling_is_reported_as_stale() {
    let (store, engine) = engine_with(SettlePolicy {
        max_attempts: 2,
        interval: Duration::from_millis(1),
    });
    let series_id = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), series_id, &["a", "b"])
        .await
        .unwrap();
    store.set_stale_reads(10);

    let outcome = engine
        .move_item::<Unit>(
            MoveIntent::within(series_id, seeded[0].id, 0, 1),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.stale);
    assert!(outcome.is_degraded());
    assert_eq!(outcome.settle_attempts, 2);
    assert_eq!(store.count(Op::Update), outcome.writes());
}

#[tokio::test]
async fn template_insertion_reconciles_only_the_destination() {
    let (store, engine) = engine();
    let unit_id = Uuid::new_v4();
    let other_unit = Uuid::new_v4();
    for (index, name) in ["a", "b"].iter().enumerate() {
        let _: Component = store
            .inner()
            .create(fixtures::component_draft(unit_id, name, index as u32 + 1))
            .await
            .unwrap();
    }
    // A gap elsewhere must be left alone.
    let _: Component = store
        .inner()
        .create(fixtures::component_draft(other_unit, "lonely", 5))
        .await
        .unwrap();

    let (created, outcome) = engine
        .insert_template("forum", unit_id, 0, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(created.sequence_order, 1);
    assert_eq!(outcome.corrections.len(), 2);

    let all: Vec<Component> = store.inner().list(None).await.unwrap();
    assert_dense(&all, unit_id);
    let lonely = all.iter().find(|c| c.unit_id == other_unit).unwrap();
    assert_eq!(lonely.sequence_order, 5);
}

#[tokio::test]
async fn removal_under_the_wrong_parent_deletes_nothing() {
    let (store, engine) = engine();
    let real = Uuid::new_v4();
    let other = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), real, &["a", "b", "c"])
        .await
        .unwrap();

    let err = engine.remove::<Unit>(seeded[0].id, other).await.unwrap_err();

    assert!(matches!(
        err,
        ResequenceError::UnknownItem { item_id, parent_id, .. }
            if item_id == seeded[0].id && parent_id == other
    ));
    assert_eq!(store.count(Op::Delete), 0);
    let all = units(&store).await;
    assert_eq!(names(&all, real), pairs(&[("a", 1), ("b", 2), ("c", 3)]));
}

#[tokio::test]
async fn far_out_of_range_drops_land_at_the_end() {
    let (store, engine) = engine();
    let series_id = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), series_id, &["a", "b"])
        .await
        .unwrap();

    engine
        .move_item::<Unit>(
            MoveIntent::within(series_id, seeded[0].id, 0, usize::MAX),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    let all = units(&store).await;
    assert_eq!(names(&all, series_id), pairs(&[("b", 1), ("a", 2)]));

    let unit_id = Uuid::new_v4();
    let _: Component = store
        .inner()
        .create(fixtures::component_draft(unit_id, "intro", 1))
        .await
        .unwrap();
    let (created, outcome) = engine
        .insert_template("forum", unit_id, u32::MAX as usize, &CancelToken::new())
        .await
        .unwrap();
    assert!(!outcome.is_degraded());
    let components: Vec<Component> = store.inner().list(None).await.unwrap();
    assert_dense(&components, unit_id);
    let placed = components.iter().find(|c| c.id == created.id).unwrap();
    assert_eq!(placed.sequence_order, 2);
}

#[tokio::test]
async fn failed_reread_after_placement_degrades() {
    let (store, engine) = engine();
    let series_id = Uuid::new_v4();
    let seeded = fixtures::seed_units(store.inner(), series_id, &["a", "b", "c"])
        .await
        .unwrap();
    // Listings fail once the placement has been written.
    let placed = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&placed);
    store.fail_when(move |call| {
        if call.op == Op::Update {
            seen.store(true, Ordering::SeqCst);
            return false;
        }
        call.op == Op::List && seen.load(Ordering::SeqCst)
    });
    let mut events = engine.bus().subscribe();

    let outcome = engine
        .move_item::<Unit>(
            MoveIntent::within(series_id, seeded[2].id, 2, 0),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.stale);
    assert!(outcome.is_degraded());
    assert!(outcome.placed.is_some());
    assert!(outcome.corrections.is_empty());
    assert_eq!(store.count(Op::Update), 1);

    let mut degraded = None;
    while let Ok(event) = events.try_recv() {
        if let CurriculumEvent::ReconciliationDegraded { failed, parent_ids, .. } = event {
            degraded = Some((failed, parent_ids));
        }
    }
    assert_eq!(degraded, Some((0, vec![series_id])));
}
