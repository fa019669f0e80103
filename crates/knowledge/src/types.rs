//! Core data types for the knowledge pipeline.

use serde::{Deserialize, Serialize};

/// Fixed metadata carried by every document and inherited by its chunks.
///
/// Missing fields are empty strings rather than absent keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Where the text came from ("knowledgebase" or a page file path)
    #[serde(default)]
    pub source: String,

    /// Topic heading
    #[serde(default)]
    pub topic: String,

    /// Optional category label
    #[serde(default)]
    pub category: String,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            topic: topic.into(),
            category: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Label shown next to a snippet: `topic (source)`.
    pub fn display(&self) -> String {
        match (self.topic.trim(), self.source.trim()) {
            ("", "") => "unknown".to_string(),
            ("", source) => source.to_string(),
            (topic, "") => topic.to_string(),
            (topic, source) => format!("{} ({})", topic, source),
        }
    }
}

/// A normalized text document produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// A contiguous slice of a document, the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (UUID v4)
    pub id: String,

    /// Index of the parent document in the indexed batch
    pub document_index: u32,

    /// Chunk position within its document (0-indexed)
    pub position: u32,

    /// Chunk text, exactly `content[start..end]` of the parent document
    pub text: String,

    /// Metadata inherited from the parent document
    pub metadata: ChunkMetadata,

    /// Byte offset of the first byte in the parent document
    pub start: usize,

    /// Byte offset one past the last byte in the parent document
    pub end: usize,
}

/// A chunk together with its embedding, as written to the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A retrieval candidate after re-ranking.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub chunk: Chunk,

    /// Final re-rank score in `[0, 1]` for the default weights
    pub score: f32,

    /// Similarity reported by the vector index
    pub vector_score: f32,
}

/// Snapshot of the persisted index location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Whether a live generation exists at the target path
    pub exists: bool,

    /// Number of chunks in the live generation
    #[serde(rename = "chunkCount")]
    pub chunk_count: usize,

    /// Leftover backup and staging directories next to the target
    pub backups: Vec<String>,
}
