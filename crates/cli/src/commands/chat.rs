//! Chat command handler.
//!
//! Reads one question per line from stdin and keeps the conversation for
//! the whole session. `/reset` clears it, `/exit` ends the session.

use super::open_assistant;
use campus_core::{config::AppConfig, AppResult};
use campus_knowledge::Conversation;
use clap::Args;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive conversation on stdin
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Do not print the input prompt
    #[arg(long)]
    pub quiet: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let assistant = open_assistant(config).await?;
        let mut conversation = Conversation::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if !self.quiet {
                print!("> ");
                std::io::stdout().flush()?;
            }

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match line.trim() {
                "" => continue,
                "/exit" | "/quit" => break,
                "/reset" => {
                    assistant.reset_conversation(&mut conversation);
                    println!("(conversation cleared)");
                }
                question => {
                    let answer = assistant.answer(&mut conversation, question).await;
                    print!("{}", answer);
                    if !answer.ends_with('\n') {
                        println!();
                    }
                }
            }
        }

        tracing::debug!("Chat ended after {} turns", conversation.turns().len());
        assistant.release_index_resources().await;
        Ok(())
    }
}
