//! Flat JSON vector index with brute-force cosine search.
//!
//! A generation is a directory holding `entries.json` and a
//! `manifest.json` written last; a directory without a manifest is an
//! incomplete generation.

use crate::types::{Chunk, IndexEntry};
use crate::vector_index::{cosine_similarity, IndexStore, VectorIndex};
use async_trait::async_trait;
use campus_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

const ENTRIES_FILE: &str = "entries.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Summary written next to the entries of a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub backend: String,
    pub count: usize,
    pub dimensions: usize,
    /// SHA-256 over the chunk texts, in order
    pub fingerprint: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Fingerprint of a generation's content.
pub fn fingerprint(entries: &[IndexEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.chunk.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Store writing flat JSON generations.
#[derive(Debug, Default)]
pub struct FlatStore;

impl FlatStore {
    pub fn new() -> Self {
        Self
    }

    /// Read the manifest of the generation at `path`.
    pub fn read_manifest(path: &Path) -> AppResult<Manifest> {
        let contents = std::fs::read_to_string(path.join(MANIFEST_FILE)).map_err(|e| {
            AppError::Knowledge(format!("Incomplete index generation at {:?}: {}", path, e))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[async_trait]
impl IndexStore for FlatStore {
    fn backend_name(&self) -> &str {
        "flat"
    }

    async fn open(&self, path: &Path) -> AppResult<Box<dyn VectorIndex>> {
        if !path.exists() {
            return Err(AppError::IndexNotFound(format!("No index at {:?}", path)));
        }

        let manifest = Self::read_manifest(path)?;
        let contents = tokio::fs::read_to_string(path.join(ENTRIES_FILE)).await?;
        let entries: Vec<IndexEntry> = serde_json::from_str(&contents)?;

        if entries.len() != manifest.count {
            return Err(AppError::Knowledge(format!(
                "Index at {:?} holds {} entries, manifest says {}",
                path,
                entries.len(),
                manifest.count
            )));
        }

        tracing::debug!("Opened flat index at {:?} ({} entries)", path, entries.len());

        Ok(Box::new(FlatIndex { entries }))
    }

    async fn create(&self, path: &Path, entries: &[IndexEntry]) -> AppResult<()> {
        tokio::fs::create_dir_all(path).await?;

        let json = serde_json::to_string(entries)?;
        tokio::fs::write(path.join(ENTRIES_FILE), json).await?;

        let manifest = Manifest {
            backend: self.backend_name().to_string(),
            count: entries.len(),
            dimensions: entries.first().map(|e| e.embedding.len()).unwrap_or(0),
            fingerprint: fingerprint(entries),
            created_at: chrono::Utc::now(),
        };
        tokio::fs::write(path.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?).await?;

        tracing::debug!("Wrote flat index with {} entries to {:?}", entries.len(), path);
        Ok(())
    }
}

/// An in-memory copy of a flat generation.
pub struct FlatIndex {
    entries: Vec<IndexEntry>,
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn query(&self, embedding: &[f32], k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(embedding, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.entries[i].chunk.clone(), score))
            .collect())
    }

    async fn len(&self) -> AppResult<usize> {
        Ok(self.entries.len())
    }
}
