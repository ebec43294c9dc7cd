//! Persistent storage for querybot.
//!
//! The orchestrator never talks to SQLite directly. It sees the store
//! through two narrow traits:
//!
//! - [`ActionStore`] executes a single model-issued action (an SQL
//!   statement) and returns rows or an affected-row count.
//! - [`CandidateStore`] answers full-text candidate searches for the
//!   batch matching pipeline.
//!
//! [`SqliteStore`] implements both.

pub mod action;
pub mod ingest;
pub mod schema;
pub mod sqlite;

pub use action::{ActionKind, ActionOutcome, ActionRequest, Row};
pub use sqlite::{SqliteStore, StoreStats};

use crate::core::{Incentive, ScoredCompany};
use crate::error::StorageError;

/// Database path used when neither `--db-path` nor `QUERYBOT_DB_PATH` is set.
pub const DEFAULT_DB_PATH: &str = ".querybot/querybot.db";

/// Executes deterministic actions extracted from model output.
pub trait ActionStore: Send + Sync {
    /// Executes one action.
    ///
    /// Read actions return their rows; write actions are committed on
    /// success and rolled back on failure.
    ///
    /// # Errors
    ///
    /// Returns the store-native error when the action is rejected.
    fn execute(&self, request: &ActionRequest) -> Result<ActionOutcome, StorageError>;
}

/// Full-text search over match candidates.
pub trait CandidateStore: Send + Sync {
    /// Runs a full-text `MATCH` expression and returns up to `limit`
    /// candidates, most relevant first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is malformed or the store fails.
    fn search_candidates(
        &self,
        match_query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCompany>, StorageError>;

    /// Lists every batch record in identifier order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn list_incentives(&self) -> Result<Vec<Incentive>, StorageError>;
}
