//! # Outline Import Example
//!
//! Materializes a curriculum outline into an in-memory store, prints the
//! resulting tree, then drags a discipline to the top of its period.
//!
//! ```text
//! cargo run -p outline-import-demo -- path/to/outline.json
//! ```
//!
//! Without an argument the built-in sample outline is used.

use anyhow::{Context, Result};
use coursework::{
    CancelToken, Container, ContainerKind, CurriculumEngine, CurriculumEngineBuilder,
    CurriculumEvent, CurriculumOutline, Intent, MemoryStore, MoveIntent, NewContainer, Pathway,
    Series, Unit,
};
use std::env;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SAMPLE: &str = r#"
{
  "periods": [
    {
      "name": "1st Period",
      "duration_months": 6,
      "objectives": ["Mathematical foundations"],
      "disciplines": [
        {
          "name": "Calculus I",
          "code": "MAT101",
          "workload_hours": 60,
          "assessment_types": ["objective_exam", "practical_work"],
          "modules": [
            {
              "name": "Limits",
              "suggested_components": [
                { "name": "Limits lecture", "type": "media" },
                { "name": "Exercise list", "type": "activity" }
              ]
            },
            "Derivatives"
          ]
        },
        { "name": "Programming", "code": "CMP101", "modules": ["Variables", "Control flow"] },
        { "name": "Linear Algebra", "code": "MAT102", "modules": ["Vectors"] }
      ]
    },
    {
      "name": "2nd Period",
      "disciplines": [
        {
          "name": "Calculus II",
          "code": "MAT201",
          "prerequisites": ["MAT101", "MAT102"],
          "modules": ["Integrals"]
        },
        {
          "name": "Data Structures",
          "code": "CMP201",
          "prerequisites": ["CMP101", "CMP999"],
          "modules": ["Lists", "Trees"]
        }
      ]
    }
  ]
}
"#;

type Engine = CurriculumEngine<MemoryStore>;

async fn print_tree(engine: &Engine, container_id: Uuid) -> Result<()> {
    for pathway in engine.children::<Pathway>(container_id).await? {
        println!("{}. {}", pathway.sequence_order, pathway.name);
        for series in engine.children::<Series>(pathway.id).await? {
            println!(
                "   {}. {} [{}] prerequisites: {}",
                series.sequence_order,
                series.name,
                series.code,
                series.prerequisite_ids.len()
            );
            for unit in engine.children::<Unit>(series.id).await? {
                println!("      {}. {}", unit.sequence_order, unit.name);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let raw = match env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?,
        None => SAMPLE.to_owned(),
    };
    let outline = CurriculumOutline::from_json_str(&raw)?;
    for problem in outline.check() {
        println!("warning: {problem}");
    }

    println!(
        "Outline declares {} disciplines and {} objectives",
        outline.disciplines().count(),
        outline.objective_count()
    );

    let engine = CurriculumEngineBuilder::new(MemoryStore::new()).build();
    let mut events = engine.bus().subscribe();
    let cancel = CancelToken::new();

    let container: Container = engine
        .create(NewContainer {
            name: "Software Engineering".into(),
            code: "SOF-2026".into(),
            kind: ContainerKind::Undergraduate,
            description: None,
            workload_hours: None,
            duration_months: None,
            thumbnail_url: None,
        })
        .await?;

    let report = engine.materialize(container.id, &outline, &cancel).await;
    println!(
        "Created {} pathways, {} series, {} units, {} components",
        report.pathways, report.series, report.units, report.components
    );
    println!("{} objectives materialized", report.objectives);
    for missing in &report.unresolved {
        println!(
            "unresolved prerequisite: {} requires {}",
            missing.discipline_code, missing.missing_code
        );
    }
    for error in &report.errors {
        println!("failed: {error}");
    }

    println!();
    print_tree(&engine, container.id).await?;

    // Drag the last discipline of the first period to the top.
    let first = engine
        .children::<Pathway>(container.id)
        .await?
        .into_iter()
        .next()
        .context("outline has no periods")?;
    let series = engine.children::<Series>(first.id).await?;
    if let Some(last) = series.last() {
        let outcome = engine
            .dispatch(
                Intent::MoveSeries(MoveIntent::within(first.id, last.id, series.len() - 1, 0)),
                &cancel,
            )
            .await?;
        println!(
            "\nMoved {} to the top with {} writes",
            last.name,
            outcome.reconcile().writes()
        );
        print_tree(&engine, container.id).await?;
    }

    while let Ok(event) = events.try_recv() {
        if let CurriculumEvent::Reconciled { .. } = event {
            println!("event: {event:?}");
        }
    }

    Ok(())
}
