//! Ask command handler.

use super::open_assistant;
use campus_core::{config::AppConfig, AppError, AppResult};
use campus_knowledge::{detect_language, Conversation};
use clap::Args;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.question.trim();
        if question.is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }

        let assistant = open_assistant(config).await?;
        let mut conversation = Conversation::new();
        let answer = assistant.answer(&mut conversation, question).await;

        if self.json {
            let output = serde_json::json!({
                "question": question,
                "language": detect_language(question),
                "answer": answer,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print!("{}", answer);
            if !answer.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
