//! Document source adapters.
//!
//! Sources yield normalized [`Document`]s for indexing. The knowledge file
//! adapter reads exported knowledge records; the pages adapter reads the
//! text files a crawler left behind.

use crate::types::{ChunkMetadata, Document};
use async_trait::async_trait;
use campus_core::{AppError, AppResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Source label for documents built from knowledge records.
pub const KNOWLEDGE_SOURCE: &str = "knowledgebase";

/// Maximum characters kept from a page's first line when used as its topic.
const PAGE_TOPIC_CHARS: usize = 120;

/// Something that can produce the active documents to index.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch every active document.
    async fn fetch_active(&self) -> AppResult<Vec<Document>>;
}

/// A knowledge record as exported from the admin store.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeRecord {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl KnowledgeRecord {
    /// Records without a status are treated as active.
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case("active"))
            .unwrap_or(true)
    }

    fn into_document(self) -> Document {
        let content = format!(
            "Topik Bahasan: {}\n\nInformasi Detail: {}",
            self.topic.trim(),
            self.content.trim()
        );
        let metadata = ChunkMetadata::new(KNOWLEDGE_SOURCE, self.topic.trim())
            .with_category(self.category.unwrap_or_default().trim());
        Document::new(content, metadata)
    }
}

/// Reads knowledge records from a JSON array or JSON Lines file.
pub struct KnowledgeFileSource {
    path: PathBuf,
}

impl KnowledgeFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse records from file contents.
    pub fn parse_records(contents: &str) -> AppResult<Vec<KnowledgeRecord>> {
        let trimmed = contents.trim_start();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        if trimmed.starts_with('[') {
            return Ok(serde_json::from_str(trimmed)?);
        }

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    AppError::Serialization(format!("Invalid record on line {}: {}", i + 1, e))
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentSource for KnowledgeFileSource {
    fn name(&self) -> &str {
        "knowledge-file"
    }

    async fn fetch_active(&self) -> AppResult<Vec<Document>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Knowledge(format!(
                "Failed to read knowledge file {:?}: {}",
                self.path, e
            ))
        })?;

        let records = Self::parse_records(&contents)?;
        let total = records.len();

        let documents: Vec<Document> = records
            .into_iter()
            .filter(|r| r.is_active() && !r.content.trim().is_empty())
            .map(KnowledgeRecord::into_document)
            .collect();

        tracing::info!(
            "Loaded {} active knowledge records ({} total) from {:?}",
            documents.len(),
            total,
            self.path
        );

        Ok(documents)
    }
}

/// Reads crawled page text files (`*.txt`) from a directory tree.
pub struct PagesDirectorySource {
    root: PathBuf,
}

impl PagesDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_page(&self, path: &Path) -> AppResult<Option<Document>> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let topic: String = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .chars()
            .take(PAGE_TOPIC_CHARS)
            .collect();

        Ok(Some(Document::new(content, ChunkMetadata::new(relative, topic))))
    }
}

#[async_trait]
impl DocumentSource for PagesDirectorySource {
    fn name(&self) -> &str {
        "pages-directory"
    }

    async fn fetch_active(&self) -> AppResult<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(AppError::Knowledge(format!(
                "Pages directory not found: {:?}",
                self.root
            )));
        }

        let mut documents = Vec::new();

        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("txt") {
                continue;
            }

            match self.read_page(path) {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => tracing::debug!("Skipping empty page {:?}", path),
                Err(e) => tracing::warn!("Failed to read page {:?}: {}", path, e),
            }
        }

        tracing::info!("Loaded {} pages from {:?}", documents.len(), self.root);

        Ok(documents)
    }
}

/// Concatenates the documents of several sources, in order.
pub struct CompositeSource {
    sources: Vec<Box<dyn DocumentSource>>,
}

impl CompositeSource {
    pub fn new(sources: Vec<Box<dyn DocumentSource>>) -> Self {
        Self { sources }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl DocumentSource for CompositeSource {
    fn name(&self) -> &str {
        "composite"
    }

    async fn fetch_active(&self) -> AppResult<Vec<Document>> {
        let mut documents = Vec::new();
        for source in &self.sources {
            let batch = source.fetch_active().await?;
            tracing::debug!("Source '{}' yielded {} documents", source.name(), batch.len());
            documents.extend(batch);
        }
        Ok(documents)
    }
}

/// A fixed set of in-memory documents.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: Vec<Document>,
}

impl StaticSource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_active(&self) -> AppResult<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_knowledge_file_keeps_only_active_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("knowledge.json");
        fs::write(
            &path,
            r#"[
                {"topic": "Pendaftaran", "content": "Daftar lewat SMUP.", "category": "Akademik", "status": "ACTIVE"},
                {"topic": "Lama", "content": "Sudah tidak berlaku.", "status": "INACTIVE"},
                {"topic": "Kosong", "content": "   ", "status": "ACTIVE"},
                {"topic": "Tanpa status", "content": "Tetap aktif."}
            ]"#,
        )
        .unwrap();

        let docs = KnowledgeFileSource::new(&path).fetch_active().await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].content,
            "Topik Bahasan: Pendaftaran\n\nInformasi Detail: Daftar lewat SMUP."
        );
        assert_eq!(docs[0].metadata.source, KNOWLEDGE_SOURCE);
        assert_eq!(docs[0].metadata.topic, "Pendaftaran");
        assert_eq!(docs[0].metadata.category, "Akademik");
        assert_eq!(docs[1].metadata.topic, "Tanpa status");
    }

    #[tokio::test]
    async fn test_knowledge_file_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("knowledge.jsonl");
        fs::write(
            &path,
            "{\"topic\":\"A\",\"content\":\"satu\",\"status\":\"active\"}\n\n{\"topic\":\"B\",\"content\":\"dua\",\"status\":\"INACTIVE\"}\n",
        )
        .unwrap();

        let docs = KnowledgeFileSource::new(&path).fetch_active().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.topic, "A");
    }

    #[test]
    fn test_parse_records_reports_bad_line() {
        let err = KnowledgeFileSource::parse_records("{\"topic\":\"A\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_missing_knowledge_file_is_error() {
        let source = KnowledgeFileSource::new("/nonexistent/knowledge.json");
        assert!(source.fetch_active().await.is_err());
    }

    #[tokio::test]
    async fn test_pages_directory_reads_txt_files() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("fakultas");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("a.txt"), "\n  Beranda Unpad\nIsi halaman.").unwrap();
        fs::write(nested.join("b.txt"), "Fakultas Hukum").unwrap();
        fs::write(temp_dir.path().join("empty.txt"), "  \n").unwrap();
        fs::write(temp_dir.path().join("notes.md"), "ignored").unwrap();

        let docs = PagesDirectorySource::new(temp_dir.path())
            .fetch_active()
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.source, "a.txt");
        assert_eq!(docs[0].metadata.topic, "Beranda Unpad");
        assert_eq!(docs[1].metadata.source, "fakultas/b.txt");
    }

    #[tokio::test]
    async fn test_composite_preserves_order() {
        let first = StaticSource::new(vec![Document::new("one", ChunkMetadata::default())]);
        let second = StaticSource::new(vec![Document::new("two", ChunkMetadata::default())]);
        let composite = CompositeSource::new(vec![Box::new(first), Box::new(second)]);

        let docs = composite.fetch_active().await.unwrap();
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }
}
