//! Crash-safe index rebuilds.
//!
//! A rebuild chunks and embeds the documents, writes the new generation
//! into a `<path>.staging-<ts>` sibling, then swaps it in:
//!
//! 1. wait until no reader holds the index,
//! 2. rename the live generation to `<path>.backup-<ts>`, retrying with
//!    doubling backoff while the directory is locked,
//! 3. rename the staging directory onto the target path,
//! 4. release the readers and delete the backup (best effort).
//!
//! At any instant the target path holds the old complete generation,
//! nothing, or the new complete generation. When a crash leaves the target
//! absent, the next rebuild proceeds fresh and [`IndexBuilder::recover_latest_backup`]
//! can bring the previous generation back.

use crate::chunker::{split_with, splitter_for, ChunkSettings, RecursiveSplitter, Splitter};
use crate::embeddings::{embed_in_batches, EmbeddingProvider};
use crate::source::DocumentSource;
use crate::types::{Document, IndexEntry, IndexStatus};
use crate::vector_index::SharedIndex;
use campus_core::{AppConfig, AppError, AppResult};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const BACKUP_MARKER: &str = ".backup-";
const STAGING_MARKER: &str = ".staging-";

/// Tunables for a rebuild.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// How many times to try moving the live generation aside
    pub rename_attempts: u32,

    /// Delay before the second attempt; doubles after each failure
    pub rename_backoff: Duration,

    /// Texts per embedding request batch
    pub embed_batch_size: usize,

    /// Time budget for each embedding batch
    pub embed_timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            rename_attempts: 5,
            rename_backoff: Duration::from_millis(200),
            embed_batch_size: 32,
            embed_timeout: Duration::from_secs(120),
        }
    }
}

impl BuildOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            rename_attempts: config.index.rename_attempts,
            rename_backoff: Duration::from_millis(config.index.rename_backoff_ms),
            embed_batch_size: config.index.embed_batch_size,
            embed_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }
}

/// Builds and replaces index generations.
pub struct IndexBuilder {
    shared: Arc<SharedIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: Box<dyn Splitter>,
    settings: ChunkSettings,
    options: BuildOptions,
}

impl IndexBuilder {
    pub fn new(
        shared: Arc<SharedIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: ChunkSettings,
    ) -> Self {
        Self {
            shared,
            embedder,
            splitter: Box::new(RecursiveSplitter),
            settings,
            options: BuildOptions::default(),
        }
    }

    /// Create a builder with chunking and rebuild settings from configuration.
    pub fn from_config(
        config: &AppConfig,
        shared: Arc<SharedIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let settings = ChunkSettings::try_from(&config.chunking)?;
        Ok(Self::new(shared, embedder, settings)
            .with_splitter(splitter_for(&config.chunking.splitter)?)
            .with_options(BuildOptions::from_config(config)))
    }

    pub fn with_splitter(mut self, splitter: Box<dyn Splitter>) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Fetch active documents from `source` and rebuild from them.
    pub async fn build_from_source(&self, source: &dyn DocumentSource) -> AppResult<usize> {
        let documents = source
            .fetch_active()
            .await
            .map_err(|e| AppError::Indexing(format!("Failed to fetch documents: {}", e)))?;
        self.rebuild(&documents).await
    }

    /// Replace the live generation with one built from `documents`.
    ///
    /// Returns the number of chunks written. Fails with
    /// [`AppError::Indexing`] on zero documents, zero chunks, or any
    /// embedding or storage failure; the previous generation is then left
    /// in place.
    #[tracing::instrument(skip_all, fields(documents = documents.len()))]
    pub async fn rebuild(&self, documents: &[Document]) -> AppResult<usize> {
        let _maintenance = self.shared.maintenance().await;

        if documents.is_empty() {
            return Err(AppError::Indexing("No documents to index".to_string()));
        }

        let chunks = split_with(self.splitter.as_ref(), documents, &self.settings);
        if chunks.is_empty() {
            return Err(AppError::Indexing(
                "Documents produced no chunks".to_string(),
            ));
        }

        tracing::info!(
            "Split {} documents into {} chunks ({} splitter)",
            documents.len(),
            chunks.len(),
            self.splitter.name()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_in_batches(
            self.embedder.as_ref(),
            &texts,
            self.options.embed_batch_size,
            self.options.embed_timeout,
        )
        .await
        .map_err(|e| AppError::Indexing(format!("Embedding failed: {}", e)))?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();
        let count = entries.len();

        let target = self.shared.path().to_path_buf();
        self.remove_siblings(STAGING_MARKER);

        let staging = sibling(&target, STAGING_MARKER, &timestamp());
        if let Err(e) = self.shared.store().create(&staging, &entries).await {
            remove_dir_logged(&staging);
            return Err(AppError::Indexing(format!("Failed to write index: {}", e)));
        }

        let backup = {
            let _exclusive = self.shared.exclusive().await;
            self.swap_in(&staging, &target).await?
        };

        if let Some(backup) = backup {
            remove_dir_logged(&backup);
        }

        tracing::info!(
            "Indexed {} chunks into {:?} ({})",
            count,
            target,
            self.shared.store().backend_name()
        );

        Ok(count)
    }

    /// Move the live generation aside and the staged one into place.
    ///
    /// Must be called with the exclusive side of the index lock held.
    async fn swap_in(&self, staging: &Path, target: &Path) -> AppResult<Option<PathBuf>> {
        let backup = if target.exists() {
            let backup = sibling(target, BACKUP_MARKER, &timestamp());
            rename_with_retry(
                target,
                &backup,
                self.options.rename_attempts,
                self.options.rename_backoff,
                |from, to| std::fs::rename(from, to),
            )
            .await
            .map_err(|e| {
                remove_dir_logged(staging);
                e
            })?;
            Some(backup)
        } else {
            None
        };

        if let Err(e) = std::fs::rename(staging, target) {
            if let Some(backup) = &backup {
                if let Err(restore) = std::fs::rename(backup, target) {
                    tracing::error!("Failed to restore {:?}: {}", backup, restore);
                }
            }
            remove_dir_logged(staging);
            return Err(AppError::Indexing(format!(
                "Failed to move new index into place: {}",
                e
            )));
        }

        Ok(backup)
    }

    /// See [`recover_latest_backup`].
    pub async fn recover_latest_backup(&self) -> AppResult<Option<PathBuf>> {
        recover_latest_backup(&self.shared).await
    }

    /// See [`prune_backups`].
    pub async fn prune_backups(&self) -> AppResult<usize> {
        prune_backups(&self.shared).await
    }

    /// See [`index_status`].
    pub async fn status(&self) -> AppResult<IndexStatus> {
        index_status(&self.shared).await
    }

    fn remove_siblings(&self, marker: &str) {
        match list_siblings(self.shared.path(), marker) {
            Ok(dirs) => dirs.iter().for_each(|d| remove_dir_logged(d)),
            Err(e) => tracing::warn!("Failed to list leftover directories: {}", e),
        }
    }
}

/// Restore the most recent backup when the target path is absent.
///
/// Returns the backup that was restored, if any.
pub async fn recover_latest_backup(shared: &SharedIndex) -> AppResult<Option<PathBuf>> {
    let _maintenance = shared.maintenance().await;
    let _exclusive = shared.exclusive().await;

    let target = shared.path();
    if target.exists() {
        tracing::info!("Index present at {:?}; nothing to recover", target);
        return Ok(None);
    }

    let Some(latest) = list_siblings(target, BACKUP_MARKER)?.pop() else {
        return Ok(None);
    };

    std::fs::rename(&latest, target).map_err(|e| {
        AppError::Indexing(format!("Failed to restore backup {:?}: {}", latest, e))
    })?;

    tracing::info!("Restored index from {:?}", latest);
    Ok(Some(latest))
}

/// Delete every leftover backup and staging directory.
pub async fn prune_backups(shared: &SharedIndex) -> AppResult<usize> {
    let _maintenance = shared.maintenance().await;

    let mut removed = 0;
    for marker in [BACKUP_MARKER, STAGING_MARKER] {
        for dir in list_siblings(shared.path(), marker)? {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove {:?}: {}", dir, e),
            }
        }
    }

    tracing::info!("Pruned {} leftover index directories", removed);
    Ok(removed)
}

/// Describe the live generation and any leftovers next to it.
pub async fn index_status(shared: &SharedIndex) -> AppResult<IndexStatus> {
    let target = shared.path();

    let mut backups = list_siblings(target, BACKUP_MARKER)?;
    backups.extend(list_siblings(target, STAGING_MARKER)?);
    let backups = backups
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();

    let (exists, chunk_count) = match shared.acquire().await {
        Ok(handle) => (true, handle.len().await?),
        Err(AppError::IndexNotFound(_)) => (false, 0),
        Err(e) => return Err(e),
    };

    Ok(IndexStatus {
        exists,
        chunk_count,
        backups,
    })
}

/// Rename `from` to `to`, retrying with doubling backoff.
///
/// Each failure is a [`AppError::TransientLock`]; after `attempts` failures
/// the last one is escalated to [`AppError::Indexing`].
pub async fn rename_with_retry<F>(
    from: &Path,
    to: &Path,
    attempts: u32,
    backoff: Duration,
    mut rename: F,
) -> AppResult<()>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    let mut delay = backoff;
    let mut last_error = None;

    for attempt in 1..=attempts.max(1) {
        match rename(from, to) {
            Ok(()) => return Ok(()),
            Err(e) => {
                let err = AppError::TransientLock(format!("{:?}: {}", from, e));
                tracing::warn!("Rename attempt {}/{} failed: {}", attempt, attempts, err);
                last_error = Some(err);

                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(AppError::Indexing(format!(
        "Could not move the live index aside after {} attempts: {}",
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

fn sibling(target: &Path, marker: &str, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    target.with_file_name(format!("{}{}{}", name, marker, suffix))
}

/// Sibling directories named `<target><marker>*`, oldest first.
fn list_siblings(target: &Path, marker: &str) -> AppResult<Vec<PathBuf>> {
    let Some(parent) = target.parent().filter(|p| p.exists()) else {
        return Ok(Vec::new());
    };
    let prefix = format!(
        "{}{}",
        target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        marker
    );

    let mut found: Vec<PathBuf> = std::fs::read_dir(parent)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    found.sort();
    Ok(found)
}

fn remove_dir_logged(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dir) {
        tracing::warn!("Failed to delete {:?}: {}", dir, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingProvider;
    use crate::flat_index::FlatStore;
    use crate::source::StaticSource;
    use crate::types::ChunkMetadata;
    use tempfile::TempDir;

    fn builder(dir: &Path) -> IndexBuilder {
        let shared = Arc::new(SharedIndex::new(dir.join("vector_store"), Arc::new(FlatStore::new())));
        IndexBuilder::new(shared, Arc::new(HashingProvider::new(64)), ChunkSettings::new(200, 30).unwrap())
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new(
                "Topik Bahasan: Wisuda\n\nInformasi Detail: Wisuda diadakan setiap bulan Agustus.",
                ChunkMetadata::new("knowledgebase", "Wisuda"),
            ),
            Document::new(
                "Pendaftaran mahasiswa baru dibuka pada bulan Mei. ".repeat(10),
                ChunkMetadata::new("pages/daftar.txt", "Pendaftaran"),
            ),
        ]
    }

    #[tokio::test]
    async fn test_rebuild_writes_generation() {
        let temp_dir = TempDir::new().unwrap();
        let builder = builder(temp_dir.path());

        let count = builder.rebuild(&docs()).await.unwrap();
        assert!(count >= 2);

        let status = builder.status().await.unwrap();
        assert!(status.exists);
        assert_eq!(status.chunk_count, count);
        assert!(status.backups.is_empty(), "leftovers: {:?}", status.backups);
    }

    #[tokio::test]
    async fn test_rebuild_twice_replaces_generation() {
        let temp_dir = TempDir::new().unwrap();
        let builder = builder(temp_dir.path());

        builder.rebuild(&docs()).await.unwrap();
        let count = builder.rebuild(&docs()[..1]).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(builder.status().await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_zero_documents_is_indexing_error() {
        let temp_dir = TempDir::new().unwrap();
        let builder = builder(temp_dir.path());

        let result = builder.build_from_source(&StaticSource::default()).await;
        assert!(matches!(result, Err(AppError::Indexing(_))));
    }

    #[tokio::test]
    async fn test_zero_chunks_is_indexing_error() {
        let temp_dir = TempDir::new().unwrap();
        let builder = builder(temp_dir.path());

        let empty = vec![Document::new("", ChunkMetadata::default())];
        let result = builder.rebuild(&empty).await;
        assert!(matches!(result, Err(AppError::Indexing(_))));
    }

    #[tokio::test]
    async fn test_recover_and_prune_backups() {
        let temp_dir = TempDir::new().unwrap();
        let builder = builder(temp_dir.path());
        builder.rebuild(&docs()).await.unwrap();

        // Crash right after moving the live generation aside
        let target = temp_dir.path().join("vector_store");
        let older = temp_dir.path().join("vector_store.backup-20240101000000000");
        let newer = temp_dir.path().join("vector_store.backup-20250101000000000");
        std::fs::create_dir_all(&older).unwrap();
        std::fs::rename(&target, &newer).unwrap();

        assert!(!builder.status().await.unwrap().exists);

        let restored = builder.recover_latest_backup().await.unwrap();
        assert_eq!(restored, Some(newer));
        assert!(builder.status().await.unwrap().exists);

        assert_eq!(builder.prune_backups().await.unwrap(), 1);
        assert!(builder.status().await.unwrap().backups.is_empty());
    }

    #[tokio::test]
    async fn test_recover_is_noop_when_index_present() {
        let temp_dir = TempDir::new().unwrap();
        let builder = builder(temp_dir.path());
        builder.rebuild(&docs()).await.unwrap();

        assert_eq!(builder.recover_latest_backup().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_staging_is_cleared_by_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let stale = temp_dir.path().join("vector_store.staging-20240101000000000");
        std::fs::create_dir_all(&stale).unwrap();

        let builder = builder(temp_dir.path());
        builder.rebuild(&docs()).await.unwrap();

        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_rename_retries_then_succeeds() {
        let mut calls = 0;
        let result = rename_with_retry(
            Path::new("a"),
            Path::new("b"),
            5,
            Duration::from_millis(1),
            |_, _| {
                calls += 1;
                if calls < 3 {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
                } else {
                    Ok(())
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_rename_escalates_after_attempts() {
        let mut calls = 0;
        let result = rename_with_retry(
            Path::new("a"),
            Path::new("b"),
            4,
            Duration::from_millis(1),
            |_, _| {
                calls += 1;
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            },
        )
        .await;

        assert_eq!(calls, 4);
        match result {
            Err(AppError::Indexing(msg)) => assert!(msg.contains("4 attempts")),
            other => panic!("Expected Indexing error, got {:?}", other),
        }
    }
}
