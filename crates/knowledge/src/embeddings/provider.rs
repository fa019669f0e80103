//! Embedding provider trait and factory.

use super::providers::{HashingProvider, OllamaEmbeddingProvider};
use async_trait::async_trait;
use campus_core::{AppConfig, AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama", "hashing")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from the `llm` configuration section.
pub fn create_provider(config: &AppConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let llm = &config.llm;

    match llm.embedding_provider.as_str() {
        "ollama" => {
            let provider = OllamaEmbeddingProvider::new(
                &llm.endpoint,
                &llm.embedding_model,
                llm.embedding_dimensions,
                Duration::from_secs(llm.timeout_secs),
            )?;
            Ok(Arc::new(provider))
        }

        "hashing" => Ok(Arc::new(HashingProvider::new(llm.embedding_dimensions))),

        other => Err(AppError::BackendUnavailable(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, hashing",
            other
        ))),
    }
}
