//! Output formatting for CLI commands.

use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::agent::{ChatReply, MatchReport, Stage};
use crate::error::CommandError;
use crate::storage::StoreStats;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes a value as pretty JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::OutputFormat`] if the value cannot be
    /// represented as JSON.
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> Result<String, CommandError> {
        serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .map_err(|e| CommandError::OutputFormat(format!("JSON serialization failed: {e}")))
    }
}

/// Formats store status.
///
/// # Errors
///
/// Returns [`CommandError::OutputFormat`] if JSON rendering fails.
pub fn format_status(
    stats: &StoreStats,
    db_path: &Path,
    format: OutputFormat,
) -> Result<String, CommandError> {
    match format {
        OutputFormat::Text => Ok(format!(
            "Database: {}\nSchema version: {}\nCompanies: {}\nIncentives: {}\n",
            db_path.display(),
            stats.schema_version,
            stats.companies,
            stats.incentives
        )),
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "path": db_path.to_string_lossy(),
            "schema_version": stats.schema_version,
            "companies": stats.companies,
            "incentives": stats.incentives,
        })),
    }
}

/// Formats the answer to one chat message.
///
/// # Errors
///
/// Returns [`CommandError::OutputFormat`] if JSON rendering fails.
pub fn format_chat_reply(
    reply: &ChatReply,
    verbose: bool,
    format: OutputFormat,
) -> Result<String, CommandError> {
    match format {
        OutputFormat::Text => {
            let mut output = reply.answer.clone();
            if verbose {
                let queries: usize = reply
                    .iterations
                    .iter()
                    .map(|i| i.extracted_requests.len())
                    .sum();
                let forced = if reply.forced_final { " (forced final)" } else { "" };
                let _ = write!(
                    output,
                    "\n\n---\nModel calls: {}{forced} | Queries: {queries} | Tokens: {}",
                    reply.model_calls, reply.usage.total_tokens
                );
            }
            output.push('\n');
            Ok(output)
        }
        OutputFormat::Json => format.to_json(reply),
    }
}

/// Formats a finished match run.
///
/// # Errors
///
/// Returns [`CommandError::OutputFormat`] if JSON rendering fails.
pub fn format_match_report(
    report: &MatchReport,
    artifacts: (&Path, &Path),
    format: OutputFormat,
) -> Result<String, CommandError> {
    let (debug_path, results_path) = artifacts;
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            for (id, result) in &report.results {
                let _ = writeln!(output, "[{id}] {}", result.incentive.label());
                if !result.keywords.is_empty() {
                    let _ = writeln!(output, "    keywords: {}", result.keywords.join(", "));
                }
                let ranked: Vec<String> =
                    result.ranked_ids.iter().map(ToString::to_string).collect();
                let _ = writeln!(
                    output,
                    "    candidates: {} | ranked: [{}]",
                    result.candidates.len(),
                    ranked.join(", ")
                );
                let _ = writeln!(
                    output,
                    "    time: keywords {:.2}s | search {:.2}s | ranking {:.2}s | total {:.2}s",
                    result.stage_secs(Stage::KeywordExtraction),
                    result.stage_secs(Stage::CandidateSearch),
                    result.stage_secs(Stage::Ranking),
                    result.stage_secs(Stage::Total)
                );
                if let Some(error) = &result.error {
                    let _ = writeln!(output, "    error: {error}");
                }
            }
            let _ = write!(
                output,
                "\n---\nIncentives: {} ({} matched) | Tokens: {} | Time: {:.1}s\nWrote {}\n      {}\n",
                report.results.len(),
                report.succeeded(),
                report.usage.total_tokens,
                report.elapsed_secs,
                debug_path.display(),
                results_path.display()
            );
            Ok(output)
        }
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "records": report.results.len(),
            "succeeded": report.succeeded(),
            "total_tokens": report.usage.total_tokens,
            "elapsed_secs": report.elapsed_secs,
            "debug_artifact": debug_path.to_string_lossy(),
            "results_artifact": results_path.to_string_lossy(),
        })),
    }
}
