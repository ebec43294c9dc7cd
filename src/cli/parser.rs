//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// querybot: an LLM assistant over a SQLite store.
///
/// Chat with the database in natural language, or match every incentive
/// against the company registry in one batch run.
#[derive(Parser, Debug)]
#[command(name = "querybot")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the database file.
    ///
    /// Defaults to `.querybot/querybot.db` in the current directory.
    #[arg(short, long, env = "QUERYBOT_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output (debug logging).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// JSON secrets file holding `openai_api_key` (and optionally `model`).
    ///
    /// `secrets.json` in the current directory is used when present.
    #[arg(long, env = "QUERYBOT_SECRETS", global = true)]
    pub secrets: Option<PathBuf>,

    /// Directory containing prompt template files.
    #[arg(long, global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Model settings shared by the commands that call the model.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Model identifier (overrides `QUERYBOT_MODEL`).
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum tokens per completion.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f32>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the database.
    ///
    /// Creates the database file, tables and full-text index.
    #[command(after_help = r#"Examples:
  querybot init                    # Initialize in current directory
  querybot init --force            # Re-initialize (destroys existing data)
  querybot --db-path ./my.db init  # Initialize with custom path
"#)]
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Show row counts and schema version.
    Status,

    /// Load companies and/or incentives from CSV files.
    ///
    /// Each file replaces the current contents of its table.
    #[command(after_help = r#"Examples:
  querybot load --companies companies.csv
  querybot load --companies companies.csv --incentives incentives.csv
"#)]
    Load {
        /// Companies CSV (`company_name`, `cae_primary_label`,
        /// `trade_description_native`, `website`).
        #[arg(long)]
        companies: Option<PathBuf>,

        /// Incentives CSV (`title`, `description`, `ai_description`, dates,
        /// `total_budget`, `source_link`, ...).
        #[arg(long)]
        incentives: Option<PathBuf>,
    },

    /// Start an interactive chat session.
    ///
    /// Reads one message per line; `quit`, `exit`, `bye`, `q` or EOF ends
    /// the session.
    Chat {
        /// Model settings.
        #[command(flatten)]
        model: ModelArgs,

        /// Maximum query rounds per message.
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Ask a single question and print the answer.
    #[command(after_help = r#"Examples:
  querybot ask "How many companies are in the database?"
  querybot --format json ask "List incentives ending this year" | jq '.answer'
"#)]
    Ask {
        /// The question.
        message: String,

        /// Model settings.
        #[command(flatten)]
        model: ModelArgs,

        /// Maximum query rounds.
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Match every incentive to its most relevant companies.
    ///
    /// Writes `correspondence_debug.json` (full results) and
    /// `correspondence_results.json` (successful matches) to the output
    /// directory.
    #[command(name = "match", after_help = r#"Examples:
  querybot match                         # All incentives, results in ./data
  querybot match --limit 10              # First 10 incentives
  querybot match --concurrency 4         # Four records in flight
  querybot match --output-dir out/run1
"#)]
    Match {
        /// Directory for the result artifacts.
        #[arg(long, default_value = "data")]
        output_dir: PathBuf,

        /// Process only the first N incentives.
        #[arg(long)]
        limit: Option<usize>,

        /// Records processed concurrently.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-record deadline in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Delay before each record's first request, in milliseconds.
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Candidates retrieved per incentive.
        #[arg(long)]
        search_limit: Option<usize>,

        /// Companies kept per incentive after ranking.
        #[arg(long)]
        top_k: Option<usize>,

        /// Model settings.
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Write the default prompt templates for customization.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  querybot init-prompts                     # Write to ~/.config/querybot/prompts/
  querybot init-prompts --dir ./my-prompts  # Write to custom directory
"#)]
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/querybot/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::storage::DEFAULT_DB_PATH))
    }
}
