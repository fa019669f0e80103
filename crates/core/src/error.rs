//! Error types for the Campus Assistant.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! model backends, the vector index and the indexing pipeline.

use thiserror::Error;

/// Unified error type for the Campus Assistant.
///
/// All fallible functions return `Result<T, AppError>`. Answering code
/// recovers from these locally; indexing code propagates them to the caller.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generation or embedding backend is not configured or not reachable
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No persisted vector index exists at the configured path
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Rebuilding the vector index failed
    #[error("Indexing failed: {0}")]
    Indexing(String),

    /// The index directory is held by another handle and could not be moved
    #[error("Index path is locked: {0}")]
    TransientLock(String),

    /// A model call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
