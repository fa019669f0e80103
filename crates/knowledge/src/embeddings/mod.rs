//! Embedding providers.
//!
//! Provider-agnostic embedding generation: Ollama for real deployments and
//! a deterministic hashing provider for offline use.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{HashingProvider, OllamaEmbeddingProvider};

use campus_core::{AppError, AppResult};
use std::time::Duration;

/// Embed texts in fixed-size batches, preserving order.
///
/// Each batch must finish within `timeout`.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    timeout: Duration,
) -> AppResult<Vec<Vec<f32>>> {
    let mut embeddings = Vec::with_capacity(texts.len());

    for (batch_idx, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        tracing::debug!("Embedding batch {} ({} texts)", batch_idx, batch.len());
        let vectors = tokio::time::timeout(timeout, provider.embed_batch(batch))
            .await
            .map_err(|_| {
                AppError::Timeout(format!("Embedding batch {} exceeded {:?}", batch_idx, timeout))
            })??;

        if vectors.len() != batch.len() {
            return Err(AppError::Knowledge(format!(
                "Provider returned {} embeddings for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        embeddings.extend(vectors);
    }

    Ok(embeddings)
}
