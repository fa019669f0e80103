//! Built-in prompt templates.

use crate::types::PromptDefinition;

/// Identifier of the grounded answer prompt.
pub const ANSWER_PROMPT_ID: &str = "answer";

/// Identifier of the context summarization prompt.
pub const SUMMARIZE_PROMPT_ID: &str = "summarize";

const ANSWER_TEMPLATE: &str = r#"You are an informative assistant for the Universitas Padjadjaran (Unpad) website.
Answer the user's question ONLY from the context below. Never use outside knowledge and never guess.
Write the entire answer in {{language}}, regardless of the language of the context.
If the context does not contain the answer, reply with exactly this sentence and nothing else:
{{refusal}}

Conversation so far:
{{history}}

Context:
{{context}}

Question:
{{question}}

Answer:"#;

const SUMMARIZE_TEMPLATE: &str = r#"Compress the passages below into concise factual bullet points.
Preserve every fact, number, name, date and the [n] reference labels with their sources.
Do not add information that is not in the passages.

Passages:
{{context}}

Bullet points:"#;

/// Look up a built-in prompt definition.
pub fn builtin(id: &str) -> Option<PromptDefinition> {
    let (title, variables, template) = match id {
        ANSWER_PROMPT_ID => (
            "Grounded answer",
            vec!["language", "refusal", "history", "context", "question"],
            ANSWER_TEMPLATE,
        ),
        SUMMARIZE_PROMPT_ID => ("Context summarization", vec!["context"], SUMMARIZE_TEMPLATE),
        _ => return None,
    };

    Some(PromptDefinition {
        id: id.to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        variables: variables.into_iter().map(String::from).collect(),
        template: template.to_string(),
    })
}
