//! Index command handler.
//!
//! Builds the vector index from the configured sources and maintains the
//! backup and staging directories left next to it.

use super::{offline_assistant, open_assistant};
use campus_core::{config::AppConfig, AppResult};
use campus_knowledge::IndexingOutcome;
use clap::{Args, Subcommand};

/// Build and maintain the vector index
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Rebuild the index from the knowledge file and crawled pages
    Build {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the live index and leftover directories
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete leftover backup and staging directories
    Prune,
    /// Restore the latest backup when the index is missing
    Recover,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let assistant = match &self.action {
            IndexAction::Build { .. } => open_assistant(config).await?,
            _ => offline_assistant(config)?,
        };

        match &self.action {
            IndexAction::Build { json } => {
                tracing::info!("Rebuilding index at {:?}", config.index_path());
                let outcome = assistant.run_indexing().await;

                if *json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    match &outcome {
                        IndexingOutcome::Succeeded { chunks } => {
                            println!("Indexed {} chunks into {:?}", chunks, config.index_path())
                        }
                        IndexingOutcome::Failed { reason } => eprintln!("{}", reason),
                    }
                }

                if outcome.exit_code() != 0 {
                    std::process::exit(outcome.exit_code());
                }
            }

            IndexAction::Status { json } => {
                let status = assistant.index_status().await?;

                if *json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else if status.exists {
                    println!("Index: {} chunks at {:?}", status.chunk_count, config.index_path());
                } else {
                    println!("Index: missing at {:?}", config.index_path());
                }

                if !*json {
                    for leftover in &status.backups {
                        println!("  leftover: {}", leftover);
                    }
                }
            }

            IndexAction::Prune => {
                let removed = assistant.prune_backups().await?;
                println!("Removed {} leftover directories", removed);
            }

            IndexAction::Recover => match assistant.recover_latest_backup().await? {
                Some(backup) => println!("Restored index from {:?}", backup),
                None => println!("Nothing to recover"),
            },
        }

        Ok(())
    }
}
