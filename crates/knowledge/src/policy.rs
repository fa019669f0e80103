//! Answer policy: refusal sentences, output normalization and the
//! localized messages shown instead of internal errors.

use crate::language::Language;
use lazy_static::lazy_static;
use regex::Regex;

/// Refusal sentence for Indonesian questions.
pub const REFUSAL_ID: &str = "Tidak ditemukan dalam dokumen.";

/// Refusal sentence for English questions.
pub const REFUSAL_EN: &str = "Not found in the document.";

lazy_static! {
    static ref REFUSAL_PATTERN: Regex = Regex::new(
        r"(?i)tidak\s+ditemukan\s+dalam\s+dokumen\.?|not\s+found\s+in\s+the\s+document\.?"
    )
    .expect("valid refusal pattern");
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"\n{3,}").expect("valid newline pattern");
}

/// The exact refusal sentence for `language`.
pub fn refusal(language: Language) -> &'static str {
    match language {
        Language::Indonesian => REFUSAL_ID,
        Language::English => REFUSAL_EN,
    }
}

/// Rewrite either refusal sentence into `language`.
///
/// An answer that is nothing but a refusal becomes exactly the target
/// sentence; refusals embedded in a longer answer are replaced in place.
pub fn enforce_refusal_language(answer: &str, language: Language) -> String {
    let target = refusal(language);
    let trimmed = answer.trim();

    if REFUSAL_PATTERN
        .find(trimmed)
        .is_some_and(|m| m.start() == 0 && m.end() == trimmed.len())
    {
        return target.to_string();
    }

    REFUSAL_PATTERN.replace_all(answer, target).into_owned()
}

/// Collapse runs of three or more newlines, trim the end and terminate
/// with exactly one newline.
pub fn normalize_answer(answer: &str) -> String {
    let collapsed = EXCESS_NEWLINES.replace_all(answer, "\n\n");
    format!("{}\n", collapsed.trim_end())
}

/// Messages returned to users in place of internal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMessage {
    /// Generation or embedding backend was never initialized
    NotReady,

    /// No vector index has been built yet
    IndexMissing,

    /// Anything else went wrong while answering
    GenericFailure,
}

impl UserMessage {
    pub fn text(&self, language: Language) -> &'static str {
        match (self, language) {
            (UserMessage::NotReady, Language::Indonesian) => {
                "Error: Model AI (LLM atau Embeddings) gagal dimuat. Pastikan Ollama berjalan."
            }
            (UserMessage::NotReady, Language::English) => {
                "Error: The AI models (LLM or embeddings) failed to load. Make sure Ollama is running."
            }
            (UserMessage::IndexMissing, Language::Indonesian) => {
                "Database pengetahuan (vector store) belum dibuat. Admin perlu menjalankan proses indeksasi."
            }
            (UserMessage::IndexMissing, Language::English) => {
                "The knowledge database (vector store) has not been built yet. An administrator needs to run indexing first."
            }
            (UserMessage::GenericFailure, Language::Indonesian) => {
                "Terjadi kesalahan saat memproses jawaban."
            }
            (UserMessage::GenericFailure, Language::English) => {
                "An error occurred while processing the answer."
            }
        }
    }
}
