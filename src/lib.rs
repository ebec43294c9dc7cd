//! # querybot
//!
//! A model-driven assistant over a SQLite store with two modes:
//!
//! - **Interactive chat**: the model answers questions by writing SQL in
//!   fenced blocks; the orchestrator runs each statement, feeds the results
//!   back, and loops until the model answers in plain text or the iteration
//!   cap forces a final answer.
//! - **Batch matching**: every incentive goes through keyword extraction,
//!   full-text candidate search and model ranking, producing JSON artifacts.
//!
//! ## Modules
//!
//! - [`agent`]: providers, the chat orchestrator and the match pipeline
//! - [`search`]: keyword filtering and tiered full-text candidate search
//! - [`storage`]: the SQLite store, schema and CSV ingestion
//! - [`core`]: shared record types and text helpers
//! - [`cli`]: command-line interface

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod search;
pub mod storage;

pub use error::{AgentError, CommandError, Error, Result, StorageError};
pub use storage::{ActionStore, CandidateStore, SqliteStore};
