//! # Course Generator Example
//!
//! Asks the Anthropic API for a course outline, then imports it: container,
//! periods, disciplines, modules and suggested components, with prerequisite
//! codes resolved once the whole tree exists.
//!
//! ```text
//! ANTHROPIC_API_KEY=... cargo run -p course-generator-demo -- "Data Science"
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use coursework::{
    generate_outline, CancelToken, ContentGenerator, CourseBrief, CurriculumEngineBuilder,
    GeneratedImage, MemoryStore, Pathway, Series,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Anthropic API Types (Just plain structs)
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

// ============================================================================
// Generator
// ============================================================================

struct AnthropicGenerator {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicGenerator {
    async fn call(&self, request: AnthropicRequest) -> Result<AnthropicResponse> {
        let response = self
            .http_client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            bail!("API error {}: {}", status, body);
        }

        Ok(response.json().await?)
    }
}

/// Pulls the JSON document out of a reply, tolerating a fenced code block.
fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).context("reply is not valid JSON")
}

#[async_trait]
impl ContentGenerator for AnthropicGenerator {
    async fn generate_structured_content(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 8192,
            system: format!(
                "Answer with a single JSON document matching this JSON Schema, and nothing else:\n{}",
                serde_json::to_string_pretty(schema)?
            ),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self.call(request).await?;
        info!(
            tokens = response.usage.input_tokens + response.usage.output_tokens,
            "structured content generated"
        );
        let text = response
            .content
            .first()
            .and_then(|block| block.text.as_deref())
            .context("empty reply")?;
        extract_json(text)
    }

    async fn generate_image(&self, _prompt: &str) -> Result<GeneratedImage> {
        bail!("image generation is not available with this provider")
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_key =
        env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY environment variable required")?;
    let name = env::args().nth(1).unwrap_or_else(|| "Data Science".to_string());

    let generator = AnthropicGenerator {
        http_client: reqwest::Client::new(),
        api_key,
        model: env::var("ANTHROPIC_MODEL")
            .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
    };

    println!("Generating outline for {name}...");
    let course = generate_outline(
        &generator,
        &CourseBrief {
            name: name.clone(),
            description: None,
            with_cover: true,
        },
    )
    .await?;

    let engine = CurriculumEngineBuilder::new(MemoryStore::new()).build();
    let (container, report) = engine
        .import_course(&name, 2026, &course, &CancelToken::new())
        .await?;

    println!(
        "{} [{}]: {} pathways, {} series, {} units, {} components",
        container.name,
        container.code,
        report.pathways,
        report.series,
        report.units,
        report.components
    );
    for missing in &report.unresolved {
        println!(
            "unresolved prerequisite: {} requires {}",
            missing.discipline_code, missing.missing_code
        );
    }

    for pathway in engine.children::<Pathway>(container.id).await? {
        println!("{}. {}", pathway.sequence_order, pathway.name);
        for series in engine.children::<Series>(pathway.id).await? {
            println!("   {}. {} [{}]", series.sequence_order, series.name, series.code);
        }
    }

    Ok(())
}
