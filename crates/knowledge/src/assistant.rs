//! Answering orchestration.
//!
//! [`Assistant::answer`] runs the whole pipeline for one question:
//!
//! 1. readiness check of the generation and embedding backends
//! 2. scoped read handle on the live index
//! 3. language detection
//! 4. retrieval and lexical re-ranking
//! 5. context assembly (summarized when too long)
//! 6. prompt rendering with the recent conversation
//! 7. generation, refusal-language enforcement and output normalization
//!
//! Failures never reach the caller as errors: they are logged and replaced
//! by a localized message.

use crate::builder::{index_status, prune_backups, recover_latest_backup, IndexBuilder};
use crate::context::{assemble, ContextLimits, LlmSummarizer};
use crate::conversation::Conversation;
use crate::embeddings::{create_provider, EmbeddingProvider, OllamaEmbeddingProvider};
use crate::language::{detect_language_with, Language, LanguageDetector, TrigramProfileDetector};
use crate::policy::{enforce_refusal_language, normalize_answer, refusal, UserMessage};
use crate::retriever::{retrieve, RetrievalOptions};
use crate::source::{CompositeSource, DocumentSource, KnowledgeFileSource, PagesDirectorySource};
use crate::types::{Chunk, IndexStatus};
use crate::vector_index::{IndexStore, SharedIndex};
use campus_core::{AppConfig, AppError, AppResult};
use campus_llm::{create_client, LlmClient, LlmRequest};
use campus_prompt::{build_prompt, load_prompt, ANSWER_PROMPT_ID, SUMMARIZE_PROMPT_ID};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Model backends the assistant depends on.
///
/// Either may be missing after a failed startup; answers then return the
/// not-ready message instead of failing.
#[derive(Clone, Default)]
pub struct Backends {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl Backends {
    pub fn new(llm: Arc<dyn LlmClient>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            llm: Some(llm),
            embedder: Some(embedder),
        }
    }

    /// Initialize both backends from configuration.
    ///
    /// The Ollama embedding backend is checked once so that an unreachable
    /// server is reported at startup.
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        let llm = &config.llm;
        let timeout = Duration::from_secs(llm.timeout_secs);

        let client = create_client(&llm.provider, Some(&llm.endpoint), timeout)?;

        let embedder: Arc<dyn EmbeddingProvider> = if llm.embedding_provider == "ollama" {
            let provider = OllamaEmbeddingProvider::new(
                &llm.endpoint,
                &llm.embedding_model,
                llm.embedding_dimensions,
                timeout,
            )?;
            provider.verify().await?;
            Arc::new(provider)
        } else {
            create_provider(config)?
        };

        tracing::info!(
            "Backends ready: {} ({}), embeddings {} ({})",
            client.provider_name(),
            llm.model,
            embedder.provider_name(),
            embedder.model_name()
        );

        Ok(Self::new(client, embedder))
    }

    /// No backends; every answer reports that the models are not loaded.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.llm.is_some() && self.embedder.is_some()
    }
}

/// Result of an indexing run, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IndexingOutcome {
    Succeeded { chunks: usize },
    Failed { reason: String },
}

impl IndexingOutcome {
    /// Process exit status: 0 on success, 1 on failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            IndexingOutcome::Succeeded { .. } => 0,
            IndexingOutcome::Failed { .. } => 1,
        }
    }
}

impl From<AppResult<usize>> for IndexingOutcome {
    fn from(result: AppResult<usize>) -> Self {
        match result {
            Ok(chunks) => IndexingOutcome::Succeeded { chunks },
            Err(e) => IndexingOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}

/// Question answering over the campus knowledge index.
pub struct Assistant {
    config: AppConfig,
    backends: Backends,
    index: Arc<SharedIndex>,
    workspace: PathBuf,
    detector: Box<dyn LanguageDetector>,
}

impl Assistant {
    pub fn new(
        config: AppConfig,
        backends: Backends,
        store: Arc<dyn IndexStore>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        let index = Arc::new(SharedIndex::new(config.index_path(), store));
        Self {
            config,
            backends,
            index,
            workspace: workspace.into(),
            detector: Box::new(TrigramProfileDetector::new()),
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Answer `question` within `conversation`.
    ///
    /// Always returns text for the user; internal failures are logged.
    #[tracing::instrument(skip_all, fields(question_len = question.len()))]
    pub async fn answer(&self, conversation: &mut Conversation, question: &str) -> String {
        let language = detect_language_with(self.detector.as_ref(), question);

        let (Some(llm), Some(embedder)) = (&self.backends.llm, &self.backends.embedder) else {
            tracing::error!("Answer requested but model backends are not initialized");
            return UserMessage::NotReady.text(language).to_string();
        };

        match self
            .answer_grounded(llm, embedder.as_ref(), conversation, question, language)
            .await
        {
            Ok(answer) => answer,
            Err(AppError::IndexNotFound(detail)) => {
                tracing::warn!("No index available: {}", detail);
                UserMessage::IndexMissing.text(language).to_string()
            }
            Err(e) => {
                tracing::error!("Failed to answer question: {}", e);
                UserMessage::GenericFailure.text(language).to_string()
            }
        }
    }

    async fn answer_grounded(
        &self,
        llm: &Arc<dyn LlmClient>,
        embedder: &dyn EmbeddingProvider,
        conversation: &mut Conversation,
        question: &str,
        language: Language,
    ) -> AppResult<String> {
        let settings = &self.config.llm;
        let timeout = Duration::from_secs(settings.timeout_secs);

        // Held until the answer is complete
        let handle = self.index.acquire().await?;

        let options = RetrievalOptions::from(&self.config.retrieval);
        let ranked = tokio::time::timeout(timeout, retrieve(question, &*handle, embedder, &options))
            .await
            .map_err(|_| AppError::Timeout(format!("Retrieval exceeded {:?}", timeout)))??;

        tracing::debug!("Language {}, {} candidates after re-ranking", language, ranked.len());

        if ranked.is_empty() {
            let answer = refusal(language).to_string();
            conversation.push(question, answer.clone());
            return Ok(answer);
        }

        let chunks: Vec<Chunk> = ranked.into_iter().map(|c| c.chunk).collect();
        let summarizer = LlmSummarizer::new(
            Arc::clone(llm),
            load_prompt(&self.workspace, SUMMARIZE_PROMPT_ID)?,
            settings.model.clone(),
            settings.temperature,
            timeout,
        );
        let limits = ContextLimits {
            max_length: self.config.context.max_length,
            excerpt_length: self.config.context.excerpt_length,
        };
        let context = assemble(&chunks, limits, &summarizer).await?;

        let history = conversation.format_recent(self.config.conversation.history_window);

        let mut vars = HashMap::new();
        vars.insert("language".to_string(), language.name().to_string());
        vars.insert("refusal".to_string(), refusal(language).to_string());
        vars.insert("history".to_string(), history);
        vars.insert("context".to_string(), context);
        vars.insert("question".to_string(), question.to_string());

        let prompt = build_prompt(&load_prompt(&self.workspace, ANSWER_PROMPT_ID)?, vars)?;
        let mut request =
            LlmRequest::new(prompt.text, settings.model.clone()).with_temperature(settings.temperature);
        if let Some(max_tokens) = settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = tokio::time::timeout(timeout, llm.complete(&request))
            .await
            .map_err(|_| AppError::Timeout(format!("Generation exceeded {:?}", timeout)))??;

        drop(handle);

        let answer = enforce_refusal_language(&response.content, language);
        conversation.push(question, answer.clone());

        Ok(normalize_answer(&answer))
    }

    /// Clear the session's history.
    pub fn reset_conversation(&self, conversation: &mut Conversation) {
        conversation.reset();
        tracing::debug!("Conversation reset");
    }

    /// Rebuild the index from the configured document sources.
    pub async fn build_index(&self) -> AppResult<usize> {
        let embedder = self.backends.embedder.clone().ok_or_else(|| {
            AppError::BackendUnavailable("Embedding backend is not initialized".to_string())
        })?;

        let source = self.configured_sources();
        if source.is_empty() {
            return Err(AppError::Indexing(
                "No document sources configured (sources.knowledgeFile or sources.pagesDir)"
                    .to_string(),
            ));
        }

        let builder = IndexBuilder::from_config(&self.config, Arc::clone(&self.index), embedder)?;
        builder.build_from_source(&source).await
    }

    /// Run [`build_index`](Self::build_index) and fold the result into an
    /// outcome.
    pub async fn run_indexing(&self) -> IndexingOutcome {
        let outcome = IndexingOutcome::from(self.build_index().await);
        if let IndexingOutcome::Failed { reason } = &outcome {
            tracing::error!("Indexing failed: {}", reason);
        }
        outcome
    }

    pub async fn index_status(&self) -> AppResult<IndexStatus> {
        index_status(&self.index).await
    }

    pub async fn prune_backups(&self) -> AppResult<usize> {
        prune_backups(&self.index).await
    }

    pub async fn recover_latest_backup(&self) -> AppResult<Option<PathBuf>> {
        recover_latest_backup(&self.index).await
    }

    /// Wait until no answer holds the index open.
    pub async fn release_index_resources(&self) {
        self.index.release().await;
    }

    fn configured_sources(&self) -> CompositeSource {
        let mut sources: Vec<Box<dyn DocumentSource>> = Vec::new();
        if let Some(path) = self.config.knowledge_file() {
            sources.push(Box::new(KnowledgeFileSource::new(path)));
        }
        if let Some(dir) = self.config.pages_dir() {
            sources.push(Box::new(PagesDirectorySource::new(dir)));
        }
        CompositeSource::new(sources)
    }
}
