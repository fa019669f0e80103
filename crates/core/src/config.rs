//! Configuration management for the Campus Assistant.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.campus/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with index state stored under `.campus/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the assistant knows how to talk to.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "hashing"];

/// Vector index backends.
pub const KNOWN_INDEX_BACKENDS: [&str; 2] = ["lancedb", "flat"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .campus/)
    #[serde(skip)]
    pub workspace: PathBuf,

    /// Optional config file path
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Log level override
    #[serde(skip)]
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    #[serde(skip)]
    pub verbose: bool,

    /// Disable colored output
    #[serde(skip)]
    pub no_color: bool,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub chunking: ChunkingSettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub context: ContextSettings,

    #[serde(default)]
    pub conversation: ConversationSettings,

    #[serde(default)]
    pub sources: SourceSettings,
}

/// Generation and embedding backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// Generation provider ("ollama")
    pub provider: String,

    /// Embedding provider ("ollama" or the offline "hashing" provider)
    pub embedding_provider: String,

    /// Base URL of the model server
    pub endpoint: String,

    /// Generation model identifier
    pub model: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Embedding vector dimension
    pub embedding_dimensions: usize,

    /// Sampling temperature for answers
    pub temperature: f32,

    /// Cap on generated answer tokens, unset leaves the model default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Upper bound for a single model call, in seconds
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            embedding_provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "gemma:2b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            temperature: 0.2,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

/// Persisted vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    /// Index directory, relative paths resolve against `.campus/`
    pub path: PathBuf,

    /// Storage backend ("lancedb" or "flat")
    pub backend: String,

    /// Attempts to move the live generation aside before giving up
    pub rename_attempts: u32,

    /// Initial backoff between rename attempts, doubled each retry
    pub rename_backoff_ms: u64,

    /// Number of chunks sent to the embedding backend per request
    pub embed_batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vector_store"),
            backend: "lancedb".to_string(),
            rename_attempts: 5,
            rename_backoff_ms: 200,
            embed_batch_size: 32,
        }
    }
}

/// Chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,

    /// "recursive" (separator priority list) or "semantic" (text-splitter)
    pub splitter: String,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            splitter: "recursive".to_string(),
        }
    }
}

/// Retrieval and re-ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    /// Candidates fetched from the vector index
    pub fetch_k: usize,

    /// Candidates kept after re-ranking
    pub top_k: usize,

    /// Maximum characters of source/topic text mixed into the lexical score
    pub metadata_excerpt: usize,

    /// Weight of the lexical similarity ratio in the final score
    pub lexical_weight: f32,

    /// Weight of the vector similarity in the final score
    pub vector_weight: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            fetch_k: 20,
            top_k: 4,
            metadata_excerpt: 300,
            lexical_weight: 1.0,
            vector_weight: 0.0,
        }
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// Above this many characters the context is summarized by the model
    pub max_length: usize,

    /// Maximum characters kept from a single snippet
    pub excerpt_length: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_length: 6000,
            excerpt_length: 800,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationSettings {
    /// Number of most recent turns rendered into the prompt
    pub history_window: usize,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self { history_window: 6 }
    }
}

/// Document source locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSettings {
    /// JSON or JSON Lines export of knowledge records
    pub knowledge_file: Option<PathBuf>,

    /// Directory of crawled page text files
    pub pages_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            index: IndexSettings::default(),
            chunking: ChunkingSettings::default(),
            retrieval: RetrievalSettings::default(),
            context: ContextSettings::default(),
            conversation: ConversationSettings::default(),
            sources: SourceSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file, environment variables and defaults.
    ///
    /// Environment variables:
    /// - `CAMPUS_WORKSPACE`: Override workspace path
    /// - `CAMPUS_CONFIG`: Path to config file
    /// - `CAMPUS_PROVIDER`: Generation provider
    /// - `CAMPUS_MODEL`: Generation model
    /// - `CAMPUS_EMBEDDING_MODEL`: Embedding model
    /// - `CAMPUS_ENDPOINT`: Model server URL
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use campus_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Index: {:?}", config.index_path());
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut workspace = Self::default().workspace;
        if let Ok(path) = std::env::var("CAMPUS_WORKSPACE") {
            workspace = PathBuf::from(path);
        }
        let config_file = std::env::var("CAMPUS_CONFIG").ok().map(PathBuf::from);

        Self::load_from(&workspace, config_file)
    }

    /// Load configuration for an explicit workspace and optional config file.
    pub fn load_from(workspace: &Path, config_file: Option<PathBuf>) -> AppResult<Self> {
        if !workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                workspace
            )));
        }

        let config_path = config_file
            .clone()
            .unwrap_or_else(|| workspace.join(".campus/config.yaml"));

        let mut config = if config_path.exists() {
            Self::from_yaml_file(&config_path)?
        } else {
            Self::default()
        };
        config.workspace = workspace.to_path_buf();
        config.config_file = config_file;

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("CAMPUS_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("CAMPUS_MODEL") {
            config.llm.model = model;
        }
        if let Ok(model) = std::env::var("CAMPUS_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(endpoint) = std::env::var("CAMPUS_ENDPOINT") {
            config.llm.endpoint = endpoint;
        }

        config.log_level = std::env::var("RUST_LOG").ok();
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Parse a YAML configuration file.
    fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        serde_yaml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and the
    /// config file.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .campus directory.
    pub fn campus_dir(&self) -> PathBuf {
        self.workspace.join(".campus")
    }

    /// Ensure the .campus directory exists.
    pub fn ensure_campus_dir(&self) -> AppResult<()> {
        let campus_dir = self.campus_dir();
        if !campus_dir.exists() {
            std::fs::create_dir_all(&campus_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .campus directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved location of the live index generation.
    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.index.path)
    }

    /// Resolved location of the knowledge records file, if configured.
    pub fn knowledge_file(&self) -> Option<PathBuf> {
        self.sources.knowledge_file.as_ref().map(|p| self.resolve(p))
    }

    /// Resolved location of the crawled pages directory, if configured.
    pub fn pages_dir(&self) -> Option<PathBuf> {
        self.sources.pages_dir.as_ref().map(|p| self.resolve(p))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.campus_dir().join(path)
        }
    }

    /// Validate provider names and numeric settings.
    pub fn validate(&self) -> AppResult<()> {
        for provider in [&self.llm.provider, &self.llm.embedding_provider] {
            if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
                return Err(AppError::Config(format!(
                    "Unknown provider: {}. Supported: {}",
                    provider,
                    KNOWN_PROVIDERS.join(", ")
                )));
            }
        }

        if !KNOWN_INDEX_BACKENDS.contains(&self.index.backend.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown index backend: {}. Supported: {}",
                self.index.backend,
                KNOWN_INDEX_BACKENDS.join(", ")
            )));
        }

        if self.chunking.chunk_size == 0 {
            return Err(AppError::Config("chunkSize must be positive".to_string()));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(AppError::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }

        if self.retrieval.top_k == 0 || self.retrieval.fetch_k < self.retrieval.top_k {
            return Err(AppError::Config(format!(
                "fetchK ({}) must be at least topK ({}) and topK must be positive",
                self.retrieval.fetch_k, self.retrieval.top_k
            )));
        }

        if self.index.rename_attempts == 0 {
            return Err(AppError::Config(
                "renameAttempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
