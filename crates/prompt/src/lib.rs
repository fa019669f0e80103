//! Prompt system for the Campus Assistant.
//!
//! This crate provides:
//! - Built-in answer and summarization templates
//! - YAML overrides loaded from `.campus/prompts/`
//! - Handlebars rendering with strict variable checking

pub mod builder;
pub mod loader;
pub mod templates;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{list_prompts, load_prompt};
pub use templates::{ANSWER_PROMPT_ID, SUMMARIZE_PROMPT_ID};
pub use types::{BuiltPrompt, PromptDefinition};
