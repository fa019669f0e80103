//! End-to-end answering and indexing with in-process backends.

use async_trait::async_trait;
use campus_core::{AppConfig, AppResult};
use campus_knowledge::flat_index::FlatStore;
use campus_knowledge::{
    Assistant, Backends, Conversation, HashingProvider, IndexStore, Language, UserMessage,
    REFUSAL_EN, REFUSAL_ID,
};
use campus_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Generation double that returns a fixed reply and records every prompt.
struct ScriptedLlm {
    reply: String,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn last_prompt(&self) -> String {
        self.last_request().map(|r| r.prompt).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(LlmResponse {
            content: self.reply.clone(),
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

const RECORDS: &str = r#"[
  {"topic": "Pendaftaran", "content": "Syarat pendaftaran mahasiswa baru: ijazah SMA, rapor, dan pas foto.", "category": "Akademik", "status": "ACTIVE"},
  {"topic": "Wisuda", "content": "Wisuda diadakan setiap bulan Agustus di Grha Sanusi Hardjadinata.", "status": "active"},
  {"topic": "Arsip", "content": "Informasi lama yang tidak berlaku.", "status": "INACTIVE"}
]"#;

struct Fixture {
    _dir: TempDir,
    config: AppConfig,
    llm: Arc<ScriptedLlm>,
    assistant: Assistant,
}

impl Fixture {
    fn index_path(&self) -> PathBuf {
        self.config.index_path()
    }
}

fn fixture(reply: &str) -> Fixture {
    fixture_with(reply, |_| {})
}

fn fixture_with(reply: &str, configure: impl FnOnce(&mut AppConfig)) -> Fixture {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".campus")).unwrap();
    std::fs::write(dir.path().join(".campus/knowledge.json"), RECORDS).unwrap();

    let mut config = AppConfig::default();
    config.workspace = dir.path().to_path_buf();
    config.index.backend = "flat".to_string();
    config.index.rename_backoff_ms = 1;
    config.llm.embedding_provider = "hashing".to_string();
    config.llm.embedding_dimensions = 64;
    config.sources.knowledge_file = Some(PathBuf::from("knowledge.json"));
    configure(&mut config);

    let llm = ScriptedLlm::new(reply);
    let backends = Backends::new(llm.clone(), Arc::new(HashingProvider::new(64)));
    let assistant = Assistant::new(config.clone(), backends, Arc::new(FlatStore::new()), dir.path());

    Fixture {
        _dir: dir,
        config,
        llm,
        assistant,
    }
}

#[tokio::test]
async fn test_answer_uses_retrieved_context() {
    let fx = fixture("Syaratnya ijazah SMA, rapor, dan pas foto [1].");
    assert_eq!(fx.assistant.build_index().await.unwrap(), 2);

    let mut conversation = Conversation::new();
    let answer = fx
        .assistant
        .answer(&mut conversation, "Apa saja syarat pendaftaran?")
        .await;

    assert_eq!(answer, "Syaratnya ijazah SMA, rapor, dan pas foto [1].\n");
    assert_eq!(fx.llm.calls(), 1);

    let prompt = fx.llm.last_prompt();
    assert!(prompt.contains("Write the entire answer in Bahasa Indonesia"));
    assert!(prompt.contains("[1] "));
    assert!(prompt.contains("(no previous conversation)"));
    assert!(!prompt.contains("tidak berlaku"));
    assert_eq!(conversation.turns().len(), 1);
}

#[tokio::test]
async fn test_generation_request_uses_configured_limits() {
    let fx = fixture_with("Jawaban.", |config| config.llm.max_tokens = Some(256));
    fx.assistant.build_index().await.unwrap();

    let mut conversation = Conversation::new();
    fx.assistant
        .answer(&mut conversation, "Apa saja syarat pendaftaran?")
        .await;

    let request = fx.llm.last_request().unwrap();
    assert_eq!(request.max_tokens, Some(256));
    assert_eq!(request.temperature, Some(fx.config.llm.temperature));
    assert_eq!(request.model, fx.config.llm.model);
}

#[tokio::test]
async fn test_empty_retrieval_refuses_without_generation() {
    let fx = fixture("should not be used");
    FlatStore::new().create(&fx.index_path(), &[]).await.unwrap();

    let mut conversation = Conversation::new();
    let answer = fx
        .assistant
        .answer(&mut conversation, "Apa saja syarat pendaftaran?")
        .await;
    assert_eq!(answer, REFUSAL_ID);

    let answer = fx
        .assistant
        .answer(&mut conversation, "What are the requirements for registration?")
        .await;
    assert_eq!(answer, REFUSAL_EN);

    assert_eq!(fx.llm.calls(), 0);
}

#[tokio::test]
async fn test_english_refusal_rewritten_for_indonesian_question() {
    let fx = fixture("Not found in the document.\n\n\n");
    fx.assistant.build_index().await.unwrap();

    let mut conversation = Conversation::new();
    let answer = fx
        .assistant
        .answer(&mut conversation, "Kapan jadwal wisuda tahun ini?")
        .await;

    assert_eq!(answer, "Tidak ditemukan dalam dokumen.\n");
}

#[tokio::test]
async fn test_prompt_carries_only_recent_history() {
    let fx = fixture("Jawaban.");
    fx.assistant.build_index().await.unwrap();

    let mut conversation = Conversation::new();
    for i in 1..=10 {
        conversation.push(format!("pertanyaan nomor {:02}", i), format!("jawaban {:02}", i));
    }

    fx.assistant
        .answer(&mut conversation, "Apa saja syarat pendaftaran?")
        .await;

    let prompt = fx.llm.last_prompt();
    assert_eq!(prompt.matches("Human: ").count(), 6);
    assert!(!prompt.contains("pertanyaan nomor 04"));
    assert!(prompt.contains("pertanyaan nomor 05"));
    assert!(prompt.contains("pertanyaan nomor 10"));
    assert_eq!(conversation.turns().len(), 11);
}

#[tokio::test]
async fn test_reset_clears_history_in_prompt() {
    let fx = fixture("Jawaban.");
    fx.assistant.build_index().await.unwrap();

    let mut conversation = Conversation::new();
    fx.assistant
        .answer(&mut conversation, "Apa saja syarat pendaftaran?")
        .await;
    fx.assistant.reset_conversation(&mut conversation);
    fx.assistant
        .answer(&mut conversation, "Kapan wisuda diadakan?")
        .await;

    let prompt = fx.llm.last_prompt();
    assert!(prompt.contains("(no previous conversation)"));
    assert!(!prompt.contains("Human: "));
}

#[tokio::test]
async fn test_missing_index_reports_indexing_needed() {
    let fx = fixture("unused");

    let mut conversation = Conversation::new();
    let answer = fx
        .assistant
        .answer(&mut conversation, "What are the requirements?")
        .await;

    assert_eq!(answer, UserMessage::IndexMissing.text(Language::English));
    assert_eq!(fx.llm.calls(), 0);
    assert!(conversation.is_empty());
}

#[tokio::test]
async fn test_rebuild_after_interrupted_swap() {
    let fx = fixture("Jawaban.");
    fx.assistant.build_index().await.unwrap();

    // Crash after the live generation was moved aside
    let target = fx.index_path();
    let backup = target.with_file_name("vector_store.backup-20250101000000000");
    std::fs::rename(&target, &backup).unwrap();

    let status = fx.assistant.index_status().await.unwrap();
    assert!(!status.exists);
    assert_eq!(status.backups, vec!["vector_store.backup-20250101000000000".to_string()]);

    let outcome = fx.assistant.run_indexing().await;
    assert_eq!(outcome.exit_code(), 0);
    assert!(fx.assistant.index_status().await.unwrap().exists);

    assert_eq!(fx.assistant.prune_backups().await.unwrap(), 1);
    assert!(!backup.exists());
}

#[tokio::test]
async fn test_recover_restores_latest_backup() {
    let fx = fixture("Jawaban.");
    fx.assistant.build_index().await.unwrap();

    let target = fx.index_path();
    let backup = target.with_file_name("vector_store.backup-20250101000000000");
    std::fs::rename(&target, &backup).unwrap();

    assert_eq!(fx.assistant.recover_latest_backup().await.unwrap(), Some(backup));
    assert_eq!(fx.assistant.index_status().await.unwrap().chunk_count, 2);
}

#[tokio::test]
async fn test_concurrent_sessions_keep_separate_history() {
    let fx = Arc::new(fixture("Jawaban."));
    fx.assistant.build_index().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move {
            let mut conversation = Conversation::new();
            fx.assistant
                .answer(&mut conversation, &format!("Apa saja syarat pendaftaran {}?", i))
                .await;
            conversation.turns().len()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }
    fx.assistant.release_index_resources().await;
}
