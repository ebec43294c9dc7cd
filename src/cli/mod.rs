//! CLI layer for querybot.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing and loading the store, chatting, and running the batch
//! matcher.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, ModelArgs};
