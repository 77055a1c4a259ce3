//! Outlines and drafts used across the test suites.

use coursework::{
    ComponentKind, CurriculumOutline, DisciplineOutline, EntityStore, ModuleOutline, NewComponent,
    NewPathway, NewSeries, NewUnit, PeriodOutline, ProgressionRule, StoreResult,
    SuggestedComponent, Unit, UnlockConditions,
};
use uuid::Uuid;

pub fn discipline(name: &str, code: &str, prerequisites: &[&str]) -> DisciplineOutline {
    DisciplineOutline {
        name: name.to_owned(),
        code: Some(code.to_owned()),
        prerequisites: prerequisites.iter().map(|code| code.to_string()).collect(),
        ..Default::default()
    }
}

pub fn period(name: &str, disciplines: Vec<DisciplineOutline>) -> PeriodOutline {
    PeriodOutline {
        name: name.to_owned(),
        disciplines,
        ..Default::default()
    }
}

/// MAT101 in the first period, MAT201 requiring it in the second.
pub fn prerequisite_chain() -> CurriculumOutline {
    CurriculumOutline {
        periods: vec![
            period("1st Period", vec![discipline("Calculus I", "MAT101", &[])]),
            period(
                "2nd Period",
                vec![discipline("Calculus II", "MAT201", &["MAT101"])],
            ),
        ],
    }
}

/// FIS101 requires a code no discipline declares.
pub fn unresolved_reference() -> CurriculumOutline {
    CurriculumOutline {
        periods: vec![period(
            "1st Period",
            vec![discipline("Physics I", "FIS101", &["MAT999"])],
        )],
    }
}

/// A first-period discipline that names one declared later in the tree.
pub fn forward_reference() -> CurriculumOutline {
    CurriculumOutline {
        periods: vec![
            period("1st Period", vec![discipline("Seminar", "SEM101", &["LAB201"])]),
            period("2nd Period", vec![discipline("Laboratory", "LAB201", &[])]),
        ],
    }
}

/// Two periods, three disciplines, modules with suggested components.
pub fn engineering() -> CurriculumOutline {
    let module = |name: &str, components: &[(&str, &str)]| ModuleOutline {
        name: name.to_owned(),
        objectives: vec![format!("understand {name}")],
        topics: vec![format!("{name} basics")],
        duration_hours: None,
        suggested_components: components
            .iter()
            .map(|(kind, name)| SuggestedComponent {
                name: (*name).to_owned(),
                kind: Some((*kind).to_owned()),
                description: None,
            })
            .collect(),
    };

    let mut calculus = discipline("Calculus I", "MAT101", &[]);
    calculus.workload_hours = Some(60);
    calculus.assessment_types = vec!["objective_exam".into(), "essay_exam".into()];
    calculus.modules = vec![
        module("Limits", &[("media", "Limits lecture"), ("activity", "Exercises")]),
        module("Derivatives", &[("assessment", "Quiz")]),
    ];

    let mut programming = discipline("Programming", "CMP101", &[]);
    programming.modules = vec![module("Variables", &[("text", "Reading")])];

    let mut calculus_two = discipline("Calculus II", "MAT201", &["MAT101", "CMP101"]);
    calculus_two.modules = vec![module("Integrals", &[])];

    CurriculumOutline {
        periods: vec![
            PeriodOutline {
                duration_months: Some(6),
                objectives: vec!["foundations".into()],
                ..period("1st Period", vec![calculus, programming])
            },
            period("2nd Period", vec![calculus_two]),
        ],
    }
}

pub fn pathway_draft(container_id: Uuid, name: &str, order: u32) -> NewPathway {
    NewPathway {
        container_id,
        name: name.to_owned(),
        sequence_order: order,
        duration_months: 6,
        required: true,
        description: None,
    }
}

pub fn series_draft(pathway_id: Uuid, name: &str, code: &str, order: u32) -> NewSeries {
    NewSeries {
        pathway_id,
        name: name.to_owned(),
        code: code.to_owned(),
        sequence_order: order,
        prerequisite_ids: Vec::new(),
        workload_hours: 60,
        syllabus: None,
        offerable: true,
        reusable: true,
        standalone: false,
        max_grade: 10.0,
        passing_grade: 7.0,
        minimum_attendance: 75,
    }
}

pub fn unit_draft(series_id: Uuid, name: &str, order: u32) -> NewUnit {
    NewUnit {
        series_id,
        name: name.to_owned(),
        sequence_order: order,
        progression_rule: ProgressionRule::Free,
        unlock_conditions: UnlockConditions::default(),
        estimated_hours: None,
        description: None,
        objectives: Vec::new(),
    }
}

pub fn component_draft(unit_id: Uuid, name: &str, order: u32) -> NewComponent {
    NewComponent {
        unit_id,
        name: name.to_owned(),
        kind: ComponentKind::Text,
        content_type: None,
        sequence_order: order,
        description: String::new(),
        required: true,
        progression_rule: ProgressionRule::Free,
        duration_minutes: None,
        learning_objectives: Vec::new(),
        content_url: None,
        content_text: None,
        weight: 1.0,
    }
}

/// Creates units named after `names` under `series_id`, numbered `1..=n`.
pub async fn seed_units<S>(store: &S, series_id: Uuid, names: &[&str]) -> StoreResult<Vec<Unit>>
where
    S: EntityStore<Unit> + ?Sized,
{
    let mut units = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let draft = unit_draft(series_id, name, index as u32 + 1);
        units.push(store.create(draft).await?);
    }
    Ok(units)
}
