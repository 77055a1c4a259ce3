//! Content Generation contract.
//!
//! The engine never calls a model directly. Hosts implement
//! [`ContentGenerator`] over whatever service they use; the helpers here
//! build the schema-constrained request and parse the answer into outline
//! types for the [`Materializer`](crate::Materializer).

use crate::error::{GenerationError, OutlineError};
use crate::model::{ContainerKind, NewContainer};
use crate::outline::{lenient, CurriculumOutline, ModuleOutline};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Returns an object conforming to `schema`.
    async fn generate_structured_content(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> anyhow::Result<Value>;

    async fn generate_image(&self, prompt: &str) -> anyhow::Result<GeneratedImage>;
}

#[async_trait]
impl<G: ContentGenerator + ?Sized> ContentGenerator for std::sync::Arc<G> {
    async fn generate_structured_content(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> anyhow::Result<Value> {
        (**self).generate_structured_content(prompt, schema).await
    }

    async fn generate_image(&self, prompt: &str) -> anyhow::Result<GeneratedImage> {
        (**self).generate_image(prompt).await
    }
}

/// What to generate a whole course for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseBrief {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Also request a cover image.
    #[serde(default)]
    pub with_cover: bool,
}

/// What to generate the modules of one series for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesBrief {
    pub name: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub pathway_name: Option<String>,
}

const ASSESSMENT_TYPES: [&str; 8] = [
    "objective_exam",
    "essay_exam",
    "practical_project",
    "presentation",
    "laboratory",
    "portfolio",
    "participation",
    "self_assessment",
];

const COMPONENT_KINDS: [&str; 5] = ["media", "activity", "assessment", "attachment", "text"];

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn module_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": { "type": "string" },
            "objectives": string_list(),
            "topics": string_list(),
            "duration_hours": { "type": "number" },
            "suggested_components": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "kind": { "type": "string", "enum": COMPONENT_KINDS },
                        "name": { "type": "string" },
                        "description": { "type": "string" }
                    }
                }
            }
        }
    })
}

/// Schema for a full course: description, objectives and the outline tree.
pub fn outline_schema() -> Value {
    json!({
        "type": "object",
        "required": ["curriculum_structure"],
        "properties": {
            "description": { "type": "string" },
            "course_objectives": string_list(),
            "curriculum_structure": {
                "type": "object",
                "required": ["periods"],
                "properties": {
                    "periods": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["name", "disciplines"],
                            "properties": {
                                "name": { "type": "string" },
                                "duration_months": { "type": "number" },
                                "objectives": string_list(),
                                "description": { "type": "string" },
                                "disciplines": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "required": ["name", "code"],
                                        "properties": {
                                            "name": { "type": "string" },
                                            "code": { "type": "string" },
                                            "workload_hours": { "type": "number" },
                                            "objectives": string_list(),
                                            "syllabus": { "type": "string" },
                                            "prerequisites": {
                                                "type": "array",
                                                "items": { "type": "string" },
                                                "description": "codes of disciplines that must be taken first"
                                            },
                                            "assessment_types": {
                                                "type": "array",
                                                "items": { "type": "string", "enum": ASSESSMENT_TYPES }
                                            },
                                            "modules": { "type": "array", "items": module_schema() }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "total_hours": { "type": "number" },
            "recommended_certification": { "type": "string" },
            "total_months": { "type": "number" },
            "course_type": {
                "type": "string",
                "enum": ["undergraduate", "postgraduate", "extension", "open"]
            }
        }
    })
}

/// Schema for the modules of one series.
pub fn modules_schema() -> Value {
    json!({
        "type": "object",
        "required": ["modules"],
        "properties": {
            "syllabus": { "type": "string" },
            "objectives": string_list(),
            "modules": { "type": "array", "items": module_schema() },
            "total_hours": { "type": "number" },
            "suggested_code": { "type": "string" },
            "difficulty": {
                "type": "string",
                "enum": ["beginner", "intermediate", "advanced"]
            }
        }
    })
}

/// A generated course, ready to become a container plus its structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratedCourse {
    #[serde(alias = "descricao", default)]
    pub description: Option<String>,
    #[serde(alias = "objetivos_curso", default)]
    pub course_objectives: Vec<String>,
    #[serde(alias = "estrutura_curricular")]
    pub curriculum_structure: CurriculumOutline,
    #[serde(alias = "carga_horaria_total", default, deserialize_with = "lenient::opt_u32")]
    pub total_hours: Option<u32>,
    #[serde(alias = "certificacao_recomendada", default)]
    pub recommended_certification: Option<String>,
    #[serde(alias = "duracao_total_meses", default, deserialize_with = "lenient::opt_u32")]
    pub total_months: Option<u32>,
    #[serde(alias = "tipo_curso", default)]
    pub course_type: Option<String>,
    #[serde(skip)]
    pub cover_url: Option<String>,
}

impl GeneratedCourse {
    pub fn container_kind(&self) -> ContainerKind {
        match self.course_type.as_deref().map(str::trim) {
            Some("postgraduate" | "pos_graduacao") => ContainerKind::Postgraduate,
            Some("extension" | "extensao") => ContainerKind::Extension,
            Some("open" | "livre") => ContainerKind::Open,
            _ => ContainerKind::Undergraduate,
        }
    }

    /// Draft for the container this course will be materialized under.
    ///
    /// The code is the first three letters of the name and `year`.
    pub fn container_draft(&self, name: &str, year: i32) -> NewContainer {
        let prefix: String = name
            .trim()
            .chars()
            .take(3)
            .collect::<String>()
            .to_uppercase();
        NewContainer {
            name: name.trim().to_owned(),
            code: format!("{prefix}-{year}"),
            kind: self.container_kind(),
            description: self.description.clone(),
            workload_hours: self.total_hours,
            duration_months: self.total_months,
            thumbnail_url: self.cover_url.clone(),
        }
    }
}

/// Generated modules for an existing series.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratedModules {
    #[serde(alias = "ementa", default)]
    pub syllabus: Option<String>,
    #[serde(alias = "objetivos_disciplina", default)]
    pub objectives: Vec<String>,
    #[serde(alias = "modulos", default)]
    pub modules: Vec<ModuleOutline>,
    #[serde(alias = "carga_horaria_total", default, deserialize_with = "lenient::opt_u32")]
    pub total_hours: Option<u32>,
    #[serde(alias = "codigo_sugerido", default)]
    pub suggested_code: Option<String>,
}

fn course_prompt(brief: &CourseBrief) -> String {
    let mut prompt = format!(
        "Design a complete curriculum for a course named \"{}\". \
         Organise it in periods, each with disciplines and 3-6 modules per discipline. \
         Give every discipline a code of the form ABC-123 and list prerequisites \
         by the codes of disciplines defined earlier in the structure.",
        brief.name.trim()
    );
    if let Some(description) = brief.description.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str("\nAdditional context: ");
        prompt.push_str(description.trim());
    }
    prompt
}

fn modules_prompt(brief: &SeriesBrief) -> String {
    let mut prompt = format!(
        "Design 6-10 modules for the discipline \"{}\", with objectives, topics, \
         estimated hours and suggested components for each module.",
        brief.name.trim()
    );
    if let Some(pathway) = brief.pathway_name.as_deref() {
        prompt.push_str(&format!("\nThe discipline belongs to \"{}\".", pathway.trim()));
    }
    if let Some(details) = brief.details.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str("\nAdditional context: ");
        prompt.push_str(details.trim());
    }
    prompt
}

fn cover_prompt(brief: &CourseBrief) -> String {
    format!(
        "Professional, minimalist course cover for \"{}\", academic style, 16:9.",
        brief.name.trim()
    )
}

/// Generates a full course outline. A failed cover image is logged and
/// left out; a failed or malformed outline is an error.
pub async fn generate_outline<G>(
    generator: &G,
    brief: &CourseBrief,
) -> Result<GeneratedCourse, GenerationError>
where
    G: ContentGenerator + ?Sized,
{
    if brief.name.trim().is_empty() {
        return Err(OutlineError::Malformed("course name is empty".into()).into());
    }
    info!(course = %brief.name, "requesting course outline");
    let value = generator
        .generate_structured_content(&course_prompt(brief), &outline_schema())
        .await?;
    let mut course = parse_course(value)?;

    for problem in course.curriculum_structure.check() {
        warn!(%problem, "generated outline has issues");
    }

    if brief.with_cover {
        match generator.generate_image(&cover_prompt(brief)).await {
            Ok(image) => course.cover_url = Some(image.url),
            Err(err) => warn!(error = %err, "cover image generation failed"),
        }
    }
    debug!(
        periods = course.curriculum_structure.periods.len(),
        "course outline generated"
    );
    Ok(course)
}

/// Generates modules for an existing series.
pub async fn generate_modules<G>(
    generator: &G,
    brief: &SeriesBrief,
) -> Result<GeneratedModules, GenerationError>
where
    G: ContentGenerator + ?Sized,
{
    if brief.name.trim().is_empty() {
        return Err(OutlineError::Malformed("series name is empty".into()).into());
    }
    info!(series = %brief.name, "requesting modules");
    let value = generator
        .generate_structured_content(&modules_prompt(brief), &modules_schema())
        .await?;
    let generated: GeneratedModules = serde_json::from_value(value).map_err(OutlineError::from)?;
    if generated.modules.is_empty() {
        return Err(OutlineError::Malformed("no modules were generated".into()).into());
    }
    Ok(generated)
}

fn parse_course(value: Value) -> Result<GeneratedCourse, OutlineError> {
    let Value::Object(map) = &value else {
        return Err(OutlineError::Malformed("expected an object".into()));
    };
    if !map.contains_key("curriculum_structure") && !map.contains_key("estrutura_curricular") {
        // Some generators answer with the bare outline.
        let outline = CurriculumOutline::from_value(value)?;
        return Ok(GeneratedCourse {
            curriculum_structure: outline,
            ..Default::default()
        });
    }
    Ok(serde_json::from_value(value)?)
}
