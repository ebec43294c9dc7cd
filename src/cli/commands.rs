//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

#![allow(clippy::format_push_string)]

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::agent::{
    AgentConfig, AgentConfigBuilder, MatchPipeline, Orchestrator, PromptSet, create_provider,
};
use crate::cli::output::{OutputFormat, format_chat_reply, format_match_report, format_status};
use crate::cli::parser::{Cli, Commands, ModelArgs};
use crate::error::{CommandError, Result, StorageError};
use crate::storage::SqliteStore;
use crate::storage::ingest::{read_companies, read_incentives};

/// Secrets file picked up from the working directory when `--secrets` is
/// not given.
const DEFAULT_SECRETS_FILE: &str = "secrets.json";

/// Words that end an interactive chat session.
const EXIT_WORDS: [&str; 4] = ["quit", "exit", "bye", "q"];

/// Executes the CLI command.
///
/// Returns the text to print on stdout. The chat session writes its
/// replies directly and returns an empty string.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format),
        Commands::Status => cmd_status(&db_path, format),
        Commands::Load {
            companies,
            incentives,
        } => cmd_load(&db_path, companies.as_deref(), incentives.as_deref(), format),
        Commands::Chat {
            model,
            max_iterations,
        } => {
            let builder = with_iterations(model_overrides(cli, model), *max_iterations);
            cmd_chat(&db_path, cli, builder)
        }
        Commands::Ask {
            message,
            model,
            max_iterations,
        } => {
            let builder = with_iterations(model_overrides(cli, model), *max_iterations);
            cmd_ask(&db_path, cli, builder, message, format)
        }
        Commands::Match {
            output_dir,
            limit,
            concurrency,
            timeout_secs,
            delay_ms,
            search_limit,
            top_k,
            model,
        } => {
            let mut builder = model_overrides(cli, model);
            if let Some(n) = concurrency {
                builder = builder.max_concurrency(*n);
            }
            if let Some(secs) = timeout_secs {
                builder = builder.record_timeout(Duration::from_secs(*secs));
            }
            if let Some(ms) = delay_ms {
                builder = builder.request_delay(Duration::from_millis(*ms));
            }
            if let Some(n) = search_limit {
                builder = builder.search_limit(*n);
            }
            if let Some(k) = top_k {
                builder = builder.rank_top_k(*k);
            }
            cmd_match(&db_path, cli, builder, output_dir, *limit, format)
        }
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Opens the store and ensures it's initialized.
fn open_store(db_path: &Path) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(db_path)?;

    if !store.is_initialized()? {
        return Err(StorageError::NotInitialized.into());
    }

    Ok(Arc::new(store))
}

/// Applies the per-command model flags on top of a fresh builder.
fn model_overrides(cli: &Cli, args: &ModelArgs) -> AgentConfigBuilder {
    let mut builder = AgentConfig::builder();
    if let Some(model) = &args.model {
        builder = builder.model(model.clone());
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(dir) = &cli.prompt_dir {
        builder = builder.prompt_dir(dir.clone());
    }
    builder
}

fn with_iterations(builder: AgentConfigBuilder, max: Option<usize>) -> AgentConfigBuilder {
    match max {
        Some(n) => builder.max_iterations(n),
        None => builder,
    }
}

/// Finishes configuration: flags, then environment, then secrets file.
fn resolve_config(cli: &Cli, builder: AgentConfigBuilder) -> Result<AgentConfig> {
    let mut builder = builder.from_env();

    let secrets = cli.secrets.clone().or_else(|| {
        let fallback = PathBuf::from(DEFAULT_SECRETS_FILE);
        fallback.is_file().then_some(fallback)
    });
    if let Some(path) = secrets {
        debug!(path = %path.display(), "reading secrets file");
        builder = builder.from_secrets_file(&path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Agent configuration error: {e}"))
        })?;
    }

    let config = builder
        .build()
        .map_err(|e| CommandError::ExecutionFailed(format!("Agent configuration error: {e}")))?;
    Ok(config)
}

/// Builds an orchestrator over the store at `db_path`.
fn build_orchestrator(
    db_path: &Path,
    cli: &Cli,
    builder: AgentConfigBuilder,
) -> Result<Orchestrator> {
    let config = resolve_config(cli, builder)?;
    let store = open_store(db_path)?;
    let provider = create_provider(&config).map_err(|e| {
        CommandError::ExecutionFailed(format!("Provider creation failed: {e}"))
    })?;
    let prompts = PromptSet::load(config.prompt_dir.as_deref());

    info!(model = %config.model, max_iterations = config.max_iterations, "chat session ready");
    Ok(Orchestrator::new(provider, store, &config, &prompts)?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn cmd_init(db_path: &Path, force: bool, format: OutputFormat) -> Result<String> {
    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "Database already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    if force && db_path.exists() {
        std::fs::remove_file(db_path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to remove existing database: {e}"))
        })?;
    }

    let store = SqliteStore::open(db_path)?;
    store.init()?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Initialized querybot database at: {}\n",
            db_path.display()
        )),
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "success": true,
            "path": db_path.to_string_lossy(),
            "force": force
        }))
        .map_err(Into::into),
    }
}

fn cmd_status(db_path: &Path, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let stats = store.stats()?;
    Ok(format_status(&stats, db_path, format)?)
}

fn cmd_load(
    db_path: &Path,
    companies: Option<&Path>,
    incentives: Option<&Path>,
    format: OutputFormat,
) -> Result<String> {
    if companies.is_none() && incentives.is_none() {
        return Err(CommandError::ExecutionFailed(
            "Nothing to load. Pass --companies and/or --incentives.".to_string(),
        )
        .into());
    }

    let store = open_store(db_path)?;

    // Parse both files before touching the database.
    let company_rows = companies.map(read_companies).transpose()?;
    let incentive_rows = incentives.map(read_incentives).transpose()?;

    let company_count = company_rows
        .map(|rows| store.replace_companies(&rows))
        .transpose()?;
    let incentive_count = incentive_rows
        .map(|rows| store.replace_incentives(&rows))
        .transpose()?;

    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            if let (Some(n), Some(path)) = (company_count, companies) {
                output.push_str(&format!("Loaded {n} companies from {}\n", path.display()));
            }
            if let (Some(n), Some(path)) = (incentive_count, incentives) {
                output.push_str(&format!("Loaded {n} incentives from {}\n", path.display()));
            }
            Ok(output)
        }
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "companies": company_count,
            "incentives": incentive_count,
        }))
        .map_err(Into::into),
    }
}

fn cmd_ask(
    db_path: &Path,
    cli: &Cli,
    builder: AgentConfigBuilder,
    message: &str,
    format: OutputFormat,
) -> Result<String> {
    let mut orchestrator = build_orchestrator(db_path, cli, builder)?;
    let reply = runtime()?.block_on(orchestrator.process_message(message));
    Ok(format_chat_reply(&reply, cli.verbose, format)?)
}

fn cmd_chat(db_path: &Path, cli: &Cli, builder: AgentConfigBuilder) -> Result<String> {
    let mut orchestrator = build_orchestrator(db_path, cli, builder)?;
    let rt = runtime()?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    writeln!(stdout, "querybot chat. Type 'quit' to exit.")?;

    let mut line = String::new();
    loop {
        write!(stdout, "\nYou: ")?;
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            writeln!(stdout)?;
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message.to_lowercase().as_str()) {
            break;
        }

        let reply = rt.block_on(orchestrator.process_message(message));
        let answer = format_chat_reply(&reply, cli.verbose, OutputFormat::Text)?;
        write!(stdout, "Bot: {answer}")?;
    }

    writeln!(stdout, "Goodbye.")?;
    info!(turns = orchestrator.conversation().len(), "chat session ended");
    Ok(String::new())
}

fn cmd_match(
    db_path: &Path,
    cli: &Cli,
    builder: AgentConfigBuilder,
    output_dir: &Path,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let config = resolve_config(cli, builder)?;
    let store = open_store(db_path)?;
    let provider = create_provider(&config).map_err(|e| {
        CommandError::ExecutionFailed(format!("Provider creation failed: {e}"))
    })?;
    let prompts = PromptSet::load(config.prompt_dir.as_deref());
    let pipeline = MatchPipeline::new(provider, store, &config, &prompts);

    let report = runtime()?.block_on(pipeline.run_all(limit))?;
    let (debug_path, results_path) = report.save_artifacts(output_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write match artifacts: {e}"))
    })?;

    Ok(format_match_report(
        &report,
        (&debug_path, &results_path),
        format,
    )?)
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str(&format!(
                    "  {}\n",
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                ));
            }
            output.push_str("\nEdit these files to customize the prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "directory": target_dir.to_string_lossy(),
            "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
            "count": written.len()
        }))
        .map_err(Into::into),
    }
}
