//! Specification trees: the generated description of a curriculum that the
//! [`Materializer`](crate::Materializer) turns into records.
//!
//! Generated content is loose. Numbers may arrive as floats or strings, a
//! module may be a bare name, and the generator's native field names are
//! accepted alongside the English ones.

use crate::error::OutlineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurriculumOutline {
    #[serde(alias = "periodos")]
    pub periods: Vec<PeriodOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodOutline {
    #[serde(alias = "nome")]
    pub name: String,
    #[serde(
        alias = "duracao_meses",
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_months: Option<u32>,
    #[serde(alias = "descricao", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(alias = "objetivos", default)]
    pub objectives: Vec<String>,
    #[serde(alias = "disciplinas", default)]
    pub disciplines: Vec<DisciplineOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisciplineOutline {
    #[serde(alias = "nome")]
    pub name: String,
    #[serde(alias = "codigo", default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(
        alias = "carga_horaria",
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub workload_hours: Option<u32>,
    #[serde(alias = "ementa", default, skip_serializing_if = "Option::is_none")]
    pub syllabus: Option<String>,
    #[serde(alias = "objetivos", default)]
    pub objectives: Vec<String>,
    #[serde(alias = "pre_requisitos", default)]
    pub prerequisites: Vec<String>,
    #[serde(alias = "tipos_avaliacao", default)]
    pub assessment_types: Vec<String>,
    #[serde(alias = "modulos", default)]
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ModuleRepr")]
pub struct ModuleOutline {
    pub name: String,
    pub objectives: Vec<String>,
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<u32>,
    pub suggested_components: Vec<SuggestedComponent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestedComponent {
    #[serde(alias = "nome")]
    pub name: String,
    #[serde(alias = "tipo", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(alias = "descricao", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModuleRepr {
    Name(String),
    Full(ModuleFields),
}

#[derive(Deserialize)]
struct ModuleFields {
    #[serde(alias = "nome")]
    name: String,
    #[serde(alias = "objetivos", default)]
    objectives: Vec<String>,
    #[serde(alias = "topicos", default)]
    topics: Vec<String>,
    #[serde(alias = "duracao_horas", default, deserialize_with = "lenient::opt_u32")]
    duration_hours: Option<u32>,
    #[serde(alias = "componentes_sugeridos", default)]
    suggested_components: Vec<SuggestedComponent>,
}

impl From<ModuleRepr> for ModuleOutline {
    fn from(repr: ModuleRepr) -> Self {
        match repr {
            ModuleRepr::Name(name) => ModuleOutline {
                name,
                ..Default::default()
            },
            ModuleRepr::Full(fields) => ModuleOutline {
                name: fields.name,
                objectives: fields.objectives,
                topics: fields.topics,
                duration_hours: fields.duration_hours,
                suggested_components: fields.suggested_components,
            },
        }
    }
}

const WRAPPER_KEYS: [&str; 2] = ["curriculum_structure", "estrutura_curricular"];

impl CurriculumOutline {
    /// Accepts either the outline itself or a generator response wrapping it.
    pub fn from_value(value: Value) -> Result<Self, OutlineError> {
        let Value::Object(mut object) = value else {
            return Err(OutlineError::Malformed("expected a JSON object".into()));
        };
        if !object.contains_key("periods") && !object.contains_key("periodos") {
            let wrapped = WRAPPER_KEYS.iter().find_map(|key| object.remove(*key));
            return match wrapped {
                Some(inner @ Value::Object(_)) => Self::from_value(inner),
                _ => Err(OutlineError::MissingPeriods),
            };
        }
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, OutlineError> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    pub fn disciplines(&self) -> impl Iterator<Item = &DisciplineOutline> {
        self.periods.iter().flat_map(|period| period.disciplines.iter())
    }

    /// Problems worth surfacing that do not stop materialization.
    pub fn check(&self) -> Vec<OutlineError> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        for (p, period) in self.periods.iter().enumerate() {
            if period.name.trim().is_empty() {
                problems.push(OutlineError::EmptyPeriodName { period: p + 1 });
            }
            for (d, discipline) in period.disciplines.iter().enumerate() {
                if discipline.name.trim().is_empty() {
                    problems.push(OutlineError::EmptyDisciplineName {
                        period: p + 1,
                        discipline: d + 1,
                    });
                }
                if let Some(code) = discipline.declared_code() {
                    if !seen.insert(code) {
                        problems.push(OutlineError::DuplicateCode {
                            code: code.to_owned(),
                        });
                    }
                }
            }
        }
        problems
    }

    /// Learning objectives declared at any level.
    pub fn objective_count(&self) -> usize {
        self.periods
            .iter()
            .map(|period| {
                period.objectives.len()
                    + period
                        .disciplines
                        .iter()
                        .map(DisciplineOutline::objective_count)
                        .sum::<usize>()
            })
            .sum()
    }
}

impl PeriodOutline {
    pub fn description_text(&self) -> String {
        let mut text = self
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| self.name.clone());
        if !self.objectives.is_empty() {
            text.push_str("\n\nObjectives:\n");
            text.push_str(&numbered(&self.objectives));
        }
        text
    }
}

impl DisciplineOutline {
    /// The code as written in the tree, if any.
    pub fn declared_code(&self) -> Option<&str> {
        self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Declared code, or a code derived from the name and position.
    ///
    /// `period_position` is 1-based, `index` is the 0-based position within
    /// the period.
    pub fn effective_code(&self, period_position: usize, index: usize) -> String {
        match self.declared_code() {
            Some(code) => code.to_owned(),
            None => {
                let prefix: String = self
                    .name
                    .trim()
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .take(3)
                    .collect::<String>()
                    .to_uppercase();
                format!("{prefix}-{period_position}{index}")
            }
        }
    }

    pub fn syllabus_text(&self) -> Option<String> {
        let mut text = self.syllabus.clone().unwrap_or_default();
        if !self.objectives.is_empty() {
            text.push_str("\n\nLearning objectives:\n");
            text.push_str(&numbered(&self.objectives));
        }
        if !self.assessment_types.is_empty() {
            text.push_str("\n\nRecommended assessments:\n");
            let lines: Vec<String> = self
                .assessment_types
                .iter()
                .map(|kind| format!("• {}", kind.replace('_', " ").to_uppercase()))
                .collect();
            text.push_str(&lines.join("\n"));
        }
        let text = text.trim().to_owned();
        (!text.is_empty()).then_some(text)
    }

    fn objective_count(&self) -> usize {
        self.objectives.len()
            + self
                .modules
                .iter()
                .map(|module| module.objectives.len())
                .sum::<usize>()
    }
}

impl ModuleOutline {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description_text(&self) -> Option<String> {
        let mut sections = Vec::new();
        if !self.objectives.is_empty() {
            sections.push(format!("Objectives:\n{}", numbered(&self.objectives)));
        }
        if !self.topics.is_empty() {
            let topics: Vec<String> = self.topics.iter().map(|t| format!("• {t}")).collect();
            sections.push(format!("Topics:\n{}", topics.join("\n")));
        }
        (!sections.is_empty()).then(|| sections.join("\n\n"))
    }
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Whole numbers, floats (rounded up) and numeric strings; anything else is `None`.
    pub fn opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.ceil() as u64))
                .and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok().and_then(|f| {
                if f >= 0.0 {
                    u32::try_from(f.ceil() as u64).ok()
                } else {
                    None
                }
            }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generator_field_names_are_accepted() {
        let outline = CurriculumOutline::from_value(json!({
            "estrutura_curricular": {
                "periodos": [{
                    "nome": "1st Period",
                    "duracao_meses": 6.0,
                    "disciplinas": [{
                        "nome": "Calculus I",
                        "codigo": "MAT101",
                        "carga_horaria": "60",
                        "pre_requisitos": [],
                        "modulos": ["Limits", { "nome": "Derivatives", "objetivos": ["apply rules"] }]
                    }]
                }]
            }
        }))
        .unwrap();

        let period = &outline.periods[0];
        assert_eq!(period.duration_months, Some(6));
        let discipline = &period.disciplines[0];
        assert_eq!(discipline.workload_hours, Some(60));
        assert_eq!(discipline.modules[0], ModuleOutline::named("Limits"));
        assert_eq!(discipline.modules[1].objectives, vec!["apply rules".to_string()]);
        assert_eq!(outline.objective_count(), 1);
    }

    #[test]
    fn missing_period_list_is_an_error() {
        assert_eq!(
            CurriculumOutline::from_value(json!({ "description": "x" })),
            Err(OutlineError::MissingPeriods)
        );
    }

    #[test]
    fn check_reports_duplicates_and_blank_names() {
        let outline = CurriculumOutline::from_value(json!({
            "periods": [
                { "name": "P1", "disciplines": [{ "name": "A", "code": "X1" }, { "name": "", "code": "X1" }] },
                { "name": " " }
            ]
        }))
        .unwrap();
        let problems = outline.check();
        assert!(problems.contains(&OutlineError::DuplicateCode { code: "X1".into() }));
        assert!(problems.contains(&OutlineError::EmptyDisciplineName { period: 1, discipline: 2 }));
        assert!(problems.contains(&OutlineError::EmptyPeriodName { period: 2 }));
    }

    #[test]
    fn fallback_code_uses_name_and_position() {
        let discipline = DisciplineOutline {
            name: "physics lab".into(),
            ..Default::default()
        };
        assert_eq!(discipline.effective_code(2, 0), "PHY-20");

        let coded = DisciplineOutline {
            name: "Physics".into(),
            code: Some(" FIS101 ".into()),
            ..Default::default()
        };
        assert_eq!(coded.effective_code(2, 0), "FIS101");
    }

    #[test]
    fn syllabus_lists_objectives_and_assessments() {
        let discipline = DisciplineOutline {
            name: "Calculus".into(),
            syllabus: Some("Limits and derivatives.".into()),
            objectives: vec!["compute limits".into()],
            assessment_types: vec!["written_exam".into()],
            ..Default::default()
        };
        let text = discipline.syllabus_text().unwrap();
        assert!(text.starts_with("Limits and derivatives."));
        assert!(text.contains("1. compute limits"));
        assert!(text.contains("• WRITTEN EXAM"));

        assert_eq!(DisciplineOutline::default().syllabus_text(), None);
    }
}
