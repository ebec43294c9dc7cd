//! Formats action results into the next conversation turn.

use std::fmt::Write;

use super::executor::ActionResult;
use super::prompt::{PromptSet, fill_template};

/// Leads every decision turn.
const RESULTS_HEADER: &str = "The following SQL queries were executed and returned these results:";

/// Builds decision and final-iteration turns from templates.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    decision_template: String,
    final_template: String,
}

impl ContextBuilder {
    /// Creates a builder from explicit templates.
    #[must_use]
    pub fn new(decision_template: impl Into<String>, final_template: impl Into<String>) -> Self {
        Self {
            decision_template: decision_template.into(),
            final_template: final_template.into(),
        }
    }

    /// Creates a builder from a loaded prompt set.
    #[must_use]
    pub fn from_prompts(prompts: &PromptSet) -> Self {
        Self::new(&prompts.decision, &prompts.final_iteration)
    }

    /// Formats results as a human-readable block, one entry per result in
    /// execution order.
    ///
    /// Returns an empty string for an empty slice.
    #[must_use]
    pub fn format_results(results: &[ActionResult]) -> String {
        let mut out = String::new();

        for result in results {
            if !out.is_empty() {
                out.push('\n');
            }
            if !result.success {
                let _ = write!(
                    out,
                    "Query failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            } else if result.row_count > 0 {
                let _ = write!(out, "Query executed successfully ({} rows):", result.row_count);
                for (i, row) in result.rows.iter().enumerate() {
                    let rendered = serde_json::to_string(row).unwrap_or_default();
                    let _ = write!(out, "\nRow {}: {rendered}", i + 1);
                }
                let more = result.truncated_rows();
                if more > 0 {
                    let _ = write!(out, "\n... and {more} more rows");
                }
            } else if let Some(affected) = result.affected {
                let _ = write!(
                    out,
                    "Query executed successfully (no rows returned, {affected} rows affected)"
                );
            } else {
                out.push_str("Query executed successfully (no rows returned)");
            }
        }
        out
    }

    /// Builds the user turn that feeds results back to the model.
    ///
    /// Returns `None` if the formatted results are empty.
    #[must_use]
    pub fn decision_turn(
        &self,
        results: &[ActionResult],
        original_user_message: &str,
        iteration: usize,
        max_iterations: usize,
    ) -> Option<String> {
        let output = Self::format_results(results);
        if output.trim().is_empty() {
            return None;
        }

        let iteration = iteration.to_string();
        let max_iterations = max_iterations.to_string();
        let decision = fill_template(
            &self.decision_template,
            &[
                ("query_output", &output),
                ("original_user_message", original_user_message),
                ("iteration_count", &iteration),
                ("max_iterations", &max_iterations),
            ],
        );

        Some(format!("{RESULTS_HEADER}\n\n{output}\n\n{decision}"))
    }

    /// Builds the user turn for the forced final answer.
    #[must_use]
    pub fn final_turn(&self, original_user_message: &str, max_iterations: usize) -> String {
        fill_template(
            &self.final_template,
            &[
                ("max_iterations", &max_iterations.to_string()),
                ("original_user_message", original_user_message),
            ],
        )
    }
}
