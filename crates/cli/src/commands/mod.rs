//! Command handlers for the Campus Assistant CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod index;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use index::IndexCommand;

use campus_core::{config::AppConfig, AppResult};
use campus_knowledge::{create_store, Assistant, Backends};

/// Build an assistant for `config`.
///
/// Unreachable model backends do not abort the command: answers then report
/// that the models are not loaded, and indexing fails with a clear reason.
pub async fn open_assistant(config: &AppConfig) -> AppResult<Assistant> {
    let backends = match Backends::connect(config).await {
        Ok(backends) => backends,
        Err(e) => {
            tracing::error!("Failed to initialize model backends: {}", e);
            Backends::unavailable()
        }
    };

    assistant_with(config, backends)
}

/// Build an assistant without contacting the model backends, for index
/// maintenance.
pub fn offline_assistant(config: &AppConfig) -> AppResult<Assistant> {
    assistant_with(config, Backends::unavailable())
}

fn assistant_with(config: &AppConfig, backends: Backends) -> AppResult<Assistant> {
    let store = create_store(config)?;
    Ok(Assistant::new(
        config.clone(),
        backends,
        store,
        config.workspace.clone(),
    ))
}
