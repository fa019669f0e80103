//! Vector index abstraction.
//!
//! An [`IndexStore`] persists one index generation per directory and opens
//! it again as a [`VectorIndex`]. [`SharedIndex`] guards a generation path:
//! readers hold an [`IndexHandle`] for the duration of a request and the
//! index builder takes the exclusive side while it swaps generations.

use crate::flat_index::FlatStore;
use crate::lancedb_index::LanceDbStore;
use crate::types::{Chunk, IndexEntry};
use async_trait::async_trait;
use campus_core::{AppConfig, AppError, AppResult};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An opened, read-only index generation.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The `k` nearest chunks to `embedding`, best first, with their cosine
    /// similarity.
    async fn query(&self, embedding: &[f32], k: usize) -> AppResult<Vec<(Chunk, f32)>>;

    /// Number of stored chunks.
    async fn len(&self) -> AppResult<usize>;

    async fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Creates and opens index generations on disk.
#[async_trait]
pub trait IndexStore: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Open the generation at `path`.
    ///
    /// Fails with [`AppError::IndexNotFound`] when nothing exists there.
    async fn open(&self, path: &Path) -> AppResult<Box<dyn VectorIndex>>;

    /// Write a complete generation into the (absent) directory `path`.
    async fn create(&self, path: &Path, entries: &[IndexEntry]) -> AppResult<()>;
}

/// Select the store configured in `index.backend`.
pub fn create_store(config: &AppConfig) -> AppResult<Arc<dyn IndexStore>> {
    match config.index.backend.as_str() {
        "lancedb" => Ok(Arc::new(LanceDbStore::new())),
        "flat" => Ok(Arc::new(FlatStore::new())),
        other => Err(AppError::Config(format!(
            "Unknown index backend: {}. Supported: lancedb, flat",
            other
        ))),
    }
}

/// Guards the live generation at one path.
pub struct SharedIndex {
    path: PathBuf,
    store: Arc<dyn IndexStore>,
    lock: RwLock<()>,
    rebuild: Mutex<()>,
}

impl SharedIndex {
    pub fn new(path: impl Into<PathBuf>, store: Arc<dyn IndexStore>) -> Self {
        Self {
            path: path.into(),
            store,
            lock: RwLock::new(()),
            rebuild: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Open the live generation for reading.
    ///
    /// The returned handle keeps rebuilds out until it is dropped.
    pub async fn acquire(&self) -> AppResult<IndexHandle<'_>> {
        let guard = self.lock.read().await;

        if !self.path.exists() {
            return Err(AppError::IndexNotFound(format!(
                "No index at {:?}",
                self.path
            )));
        }

        let index = self.store.open(&self.path).await?;
        Ok(IndexHandle {
            index,
            _guard: guard,
        })
    }

    /// Wait until no handle is open and keep new ones out while the guard lives.
    pub async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }

    /// Serialize rebuilds and maintenance of the generation directories.
    pub async fn maintenance(&self) -> MutexGuard<'_, ()> {
        self.rebuild.lock().await
    }

    /// Wait until every outstanding handle has been released.
    pub async fn release(&self) {
        drop(self.lock.write().await);
        tracing::debug!("Index handles released for {:?}", self.path);
    }
}

/// A scoped, shared handle to an opened generation.
///
/// Dropping it closes the index and releases the read side of the lock.
pub struct IndexHandle<'a> {
    index: Box<dyn VectorIndex>,
    _guard: RwLockReadGuard<'a, ()>,
}

impl Deref for IndexHandle<'_> {
    type Target = dyn VectorIndex;

    fn deref(&self) -> &Self::Target {
        self.index.as_ref()
    }
}

/// Cosine similarity, 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_create_store_by_backend() {
        let mut config = AppConfig::default();
        assert_eq!(create_store(&config).unwrap().backend_name(), "lancedb");

        config.index.backend = "flat".to_string();
        assert_eq!(create_store(&config).unwrap().backend_name(), "flat");

        config.index.backend = "chroma".to_string();
        assert!(create_store(&config).is_err());
    }

    #[tokio::test]
    async fn test_acquire_missing_index() {
        let temp_dir = TempDir::new().unwrap();
        let shared = SharedIndex::new(temp_dir.path().join("absent"), Arc::new(FlatStore::new()));

        match shared.acquire().await {
            Err(AppError::IndexNotFound(_)) => {}
            Err(other) => panic!("Unexpected error: {}", other),
            Ok(_) => panic!("Expected IndexNotFound"),
        };
    }

    #[tokio::test]
    async fn test_release_waits_for_open_handles() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");
        let store = Arc::new(FlatStore::new());
        store.create(&path, &[]).await.unwrap();

        let shared = Arc::new(SharedIndex::new(&path, store));
        let handle = shared.acquire().await.unwrap();

        let waiter = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move { shared.release().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
