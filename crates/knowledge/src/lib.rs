//! Campus knowledge base and answering pipeline.
//!
//! Documents from the knowledge records file and crawled pages are chunked,
//! embedded and stored in a persisted vector index ([`builder`]). Questions
//! are answered by [`assistant::Assistant`], which retrieves and re-ranks
//! passages, assembles a bounded context and asks the generation model for
//! an answer grounded only in that context, in the language of the
//! question.

pub mod assistant;
pub mod builder;
pub mod chunker;
pub mod context;
pub mod conversation;
pub mod embeddings;
pub mod flat_index;
pub mod lancedb_index;
pub mod language;
pub mod policy;
pub mod retriever;
pub mod source;
pub mod types;
pub mod vector_index;

// Re-export commonly used types
pub use assistant::{Assistant, Backends, IndexingOutcome};
pub use builder::{BuildOptions, IndexBuilder};
pub use chunker::{split, ChunkSettings};
pub use conversation::{Conversation, ConversationTurn};
pub use embeddings::{create_provider, EmbeddingProvider, HashingProvider};
pub use language::{detect_language, Language, LanguageDetector};
pub use policy::{UserMessage, REFUSAL_EN, REFUSAL_ID};
pub use retriever::{retrieve, RetrievalOptions};
pub use source::{CompositeSource, DocumentSource, KnowledgeFileSource, PagesDirectorySource, StaticSource};
pub use types::{Chunk, ChunkMetadata, Document, IndexEntry, IndexStatus, RankedCandidate};
pub use vector_index::{create_store, IndexStore, SharedIndex, VectorIndex};
