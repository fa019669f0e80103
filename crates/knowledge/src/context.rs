//! Context assembly.
//!
//! Turns ranked chunks into numbered snippets for the answer prompt and
//! falls back to model summarization when the block is too long.

use crate::types::Chunk;
use async_trait::async_trait;
use campus_core::{AppError, AppResult};
use campus_llm::{LlmClient, LlmRequest};
use campus_prompt::{build_prompt, PromptDefinition};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    static ref SOURCE_ANNOTATION: Regex =
        Regex::new(r"(?i)^\s*(source|sumber)\s*:").expect("valid annotation pattern");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace pattern");
}

/// Compresses an over-long context block.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, context: &str) -> AppResult<String>;
}

/// Summarizer backed by the generation model and the `summarize` prompt.
pub struct LlmSummarizer {
    client: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl LlmSummarizer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        prompt: PromptDefinition,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            prompt,
            model: model.into(),
            temperature,
            timeout,
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, context: &str) -> AppResult<String> {
        let mut vars = HashMap::new();
        vars.insert("context".to_string(), context.to_string());
        let built = build_prompt(&self.prompt, vars)?;

        let request = LlmRequest::new(built.text, self.model.clone()).with_temperature(self.temperature);
        let response = tokio::time::timeout(self.timeout, self.client.complete(&request))
            .await
            .map_err(|_| AppError::Timeout(format!("Summarization exceeded {:?}", self.timeout)))??;

        Ok(response.content.trim().to_string())
    }
}

/// Limits applied while assembling context.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    /// Characters above which the joined block is summarized
    pub max_length: usize,

    /// Characters kept from each chunk before the ellipsis
    pub excerpt_length: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_length: 6000,
            excerpt_length: 800,
        }
    }
}

/// Drop trailing `source:`/`sumber:` lines, collapse whitespace, and cut to
/// `limit` characters with an ellipsis.
pub fn clean_excerpt(text: &str, limit: usize) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while let Some(last) = lines.last() {
        if last.trim().is_empty() || SOURCE_ANNOTATION.is_match(last) {
            lines.pop();
        } else {
            break;
        }
    }

    let collapsed = WHITESPACE.replace_all(&lines.join(" "), " ").trim().to_string();

    if collapsed.chars().count() <= limit {
        return collapsed;
    }

    let truncated: String = collapsed.chars().take(limit).collect();
    format!("{}…", truncated.trim_end())
}

/// Format one snippet as `[n] topic (source)` followed by its text.
pub fn format_snippet(ordinal: usize, chunk: &Chunk, excerpt_length: usize) -> String {
    format!(
        "[{}] {}\n{}",
        ordinal,
        chunk.metadata.display(),
        clean_excerpt(&chunk.text, excerpt_length)
    )
}

/// Build the context block for `chunks`, summarizing when it exceeds
/// `limits.max_length` characters.
pub async fn assemble(
    chunks: &[Chunk],
    limits: ContextLimits,
    summarizer: &dyn Summarizer,
) -> AppResult<String> {
    let joined = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format_snippet(i + 1, chunk, limits.excerpt_length))
        .collect::<Vec<_>>()
        .join("\n\n");

    let length = joined.chars().count();
    if length <= limits.max_length {
        return Ok(joined);
    }

    tracing::info!(
        "Context of {} chars exceeds {}; summarizing",
        length,
        limits.max_length
    );
    summarizer.summarize(&joined).await
}
