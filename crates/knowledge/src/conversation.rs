//! Per-session conversation memory.

use serde::{Deserialize, Serialize};

/// Rendered in place of the history block when nothing was said yet.
pub const EMPTY_HISTORY: &str = "(no previous conversation)";

/// One question and the answer returned for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Ordered turns of one chat session.
///
/// Owned by the caller and passed to each answer, so sessions never share
/// history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ConversationTurn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render the last `window` turns as `Human:`/`Assistant:` pairs.
    pub fn format_recent(&self, window: usize) -> String {
        let start = self.turns.len().saturating_sub(window);
        let recent = &self.turns[start..];

        if recent.is_empty() {
            return EMPTY_HISTORY.to_string();
        }

        recent
            .iter()
            .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer.trim_end()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
