//! Error types for querybot.
//!
//! Errors are layered: storage and agent failures have their own enums,
//! and the CLI wraps everything in [`Error`]. Only failures that happen
//! before orchestration starts (configuration, connectivity) are allowed
//! to reach `main` and terminate the process.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by the CLI layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Agent (model, pipeline) failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure outside the storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the backing store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite returned an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The schema has not been created yet.
    #[error("database not initialized; run `querybot init` first")]
    NotInitialized,

    /// Another thread panicked while holding the connection lock.
    #[error("database connection lock poisoned")]
    LockPoisoned,

    /// A CSV file could not be read.
    #[error("failed to read CSV {path}: {message}")]
    Csv {
        /// Path of the offending file.
        path: PathBuf,
        /// Reader error.
        message: String,
    },

    /// Filesystem error while opening or creating the database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the model client and the orchestration layer.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key could be resolved from flags, environment or secrets file.
    #[error("API key not found; set OPENAI_API_KEY or add openai_api_key to secrets.json")]
    ApiKeyMissing,

    /// The configured provider name has no implementation.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name from configuration.
        name: String,
    },

    /// The completion request failed (auth, rate limit, transport).
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error text.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The model answered with something we could not interpret.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// A pipeline step failed for a reason other than the provider.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Description of the failure.
        message: String,
    },

    /// A prompt template or secrets file could not be read.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the failure.
        message: String,
    },

    /// A record exceeded its processing deadline.
    #[error("timed out after {seconds}s")]
    Timeout {
        /// Deadline that was exceeded.
        seconds: u64,
    },

    /// The store rejected a request issued on behalf of the pipeline.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while executing CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command could not complete.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Output could not be rendered.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),
}
