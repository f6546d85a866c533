//! The section generation capability.
//!
//! [`SectionGenerator`] is the seam the task units call through: one section,
//! one model, one result. [`LlmSectionGenerator`] is the production
//! implementation on top of a [`MessageSender`].

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::json::{parse_object, unwrap_section};
use crate::llm::{ChatRequest, LlmError, MessageSender};
use crate::sections::SectionSpec;

/// The generated content of one section.
pub type SectionValue = Value;

/// What the user asked to research.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchContext {
    pub measure_name: String,
    pub context: String,
}

impl ResearchContext {
    pub fn new(measure_name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            measure_name: measure_name.into(),
            context: context.into(),
        }
    }
}

/// Failure reported by a generation call.
#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Produces one section's value with a given model.
#[allow(async_fn_in_trait)]
pub trait SectionGenerator {
    async fn generate(
        &self,
        spec: &SectionSpec,
        ctx: &ResearchContext,
        model: &str,
    ) -> Result<SectionValue, GenerationFailure>;
}

impl<T: SectionGenerator> SectionGenerator for &T {
    async fn generate(
        &self,
        spec: &SectionSpec,
        ctx: &ResearchContext,
        model: &str,
    ) -> Result<SectionValue, GenerationFailure> {
        (**self).generate(spec, ctx, model).await
    }
}

const UNIVERSAL_PROMPT: &str = "You are a Mobility Catalog Agent contributing one section of a structured mobility measure JSON.

Follow these global rules:

1. Output valid JSON only.
2. Only produce the section assigned to you.
3. Match field names and structure EXACTLY as the official schema defines.
4. Keep tone neutral, technical, and concise.
5. Avoid unverifiable claims, statistics, or speculation.
6. If you have no data for a field, return an empty string or empty array as appropriate.
7. Never include explanatory text, comments, or markdown.

Then output ONLY your assigned JSON section.";

const REPAIR_PROMPT: &str = "You are a JSON Repair Expert. Your ONLY job is to fix malformed JSON.

- Return ONLY valid, parseable JSON, with no markdown fences and no commentary.
- Preserve the original data as much as possible.
- Fix syntax errors (missing commas, unclosed quotes/braces).
- Ensure all keys and string values are properly double-quoted.";

/// Build the system and user prompts for one section.
pub fn build_prompts(spec: &SectionSpec, ctx: &ResearchContext) -> (String, String) {
    let system = format!("{UNIVERSAL_PROMPT}\n\n{}", spec.schema);
    let mut user = format!("Mobility Measure: {}", ctx.measure_name);
    if !ctx.context.trim().is_empty() {
        user.push_str(&format!("\n\nAdditional Context:\n{}", ctx.context.trim()));
    }
    (system, user)
}

/// Generates sections by prompting an LLM and parsing its JSON reply.
pub struct LlmSectionGenerator<S> {
    sender: S,
    temperature: f32,
    max_tokens: u32,
    repair_json: bool,
}

impl<S: MessageSender> LlmSectionGenerator<S> {
    pub fn new(sender: S, temperature: f32, max_tokens: u32) -> Self {
        Self {
            sender,
            temperature,
            max_tokens,
            repair_json: true,
        }
    }

    /// Disable the follow-up request that asks the model to fix unparseable output.
    pub fn without_repair(mut self) -> Self {
        self.repair_json = false;
        self
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    async fn repair(
        &self,
        spec: &SectionSpec,
        model: &str,
        broken: &str,
        error: &str,
    ) -> Result<SectionValue, GenerationFailure> {
        warn!(section = %spec.key, model, error = %error, "section output is not valid JSON, requesting repair");
        let req = ChatRequest {
            model: model.to_string(),
            system: REPAIR_PROMPT.to_string(),
            user: format!(
                "I have some malformed JSON that failed to parse.\n\nERROR: {error}\n\nBROKEN JSON:\n{broken}\n\nEXPECTED SCHEMA/CONTEXT:\n{}\n\nPlease fix the JSON errors and return the valid JSON object.",
                spec.schema
            ),
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };
        let fixed = self.sender.send_message(&req).await?;
        parse_object(&fixed).map_err(GenerationFailure::InvalidJson)
    }
}

impl<S: MessageSender> SectionGenerator for LlmSectionGenerator<S> {
    async fn generate(
        &self,
        spec: &SectionSpec,
        ctx: &ResearchContext,
        model: &str,
    ) -> Result<SectionValue, GenerationFailure> {
        let (system, user) = build_prompts(spec, ctx);
        let req = ChatRequest {
            model: model.to_string(),
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let output = self.sender.send_message(&req).await?;
        let output = output.trim();
        if output.is_empty() {
            return Err(GenerationFailure::EmptyResponse);
        }
        debug!(section = %spec.key, model, chars = output.len(), "raw section output received");

        let value = match parse_object(output) {
            Ok(value) => value,
            Err(error) if self.repair_json => self.repair(spec, model, output, &error).await?,
            Err(error) => return Err(GenerationFailure::InvalidJson(error)),
        };
        let value = unwrap_section(&spec.key, value);
        // `{}` is the placeholder for a missing section.
        if value.as_object().is_some_and(|map| map.is_empty()) {
            return Err(GenerationFailure::EmptyResponse);
        }
        Ok(value)
    }
}
