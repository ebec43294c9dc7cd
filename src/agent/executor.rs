//! Action executor.
//!
//! Runs extracted actions against an [`ActionStore`] one at a time, in
//! extraction order. A failing action is recorded and the next one still
//! runs; nothing is retried.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::storage::{ActionOutcome, ActionRequest, ActionStore, Row};

/// Maximum byte length of a single action's text.
const MAX_ACTION_LEN: usize = 100_000;

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    /// The action that was run.
    pub request: ActionRequest,
    /// Whether the store accepted it.
    pub success: bool,
    /// Preview of returned rows (at most the executor's preview size).
    pub rows: Vec<Row>,
    /// Total rows returned, before truncation.
    pub row_count: usize,
    /// Rows changed by a committed write action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected: Option<usize>,
    /// Store error text on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn failed(request: ActionRequest, error: impl Into<String>) -> Self {
        Self {
            request,
            success: false,
            rows: Vec::new(),
            row_count: 0,
            affected: None,
            error: Some(error.into()),
        }
    }

    /// Number of rows omitted from the preview.
    #[must_use]
    pub fn truncated_rows(&self) -> usize {
        self.row_count.saturating_sub(self.rows.len())
    }
}

/// Executes actions against a shared store.
#[derive(Clone)]
pub struct ActionExecutor {
    store: Arc<dyn ActionStore>,
    preview_rows: usize,
}

impl ActionExecutor {
    /// Creates an executor keeping at most `preview_rows` rows per result.
    #[must_use]
    pub fn new(store: Arc<dyn ActionStore>, preview_rows: usize) -> Self {
        Self {
            store,
            preview_rows,
        }
    }

    /// Executes one action; never fails.
    #[must_use]
    pub fn execute(&self, request: &ActionRequest) -> ActionResult {
        if request.text.len() > MAX_ACTION_LEN {
            return ActionResult::failed(
                request.clone(),
                format!(
                    "action too large ({} bytes, max {MAX_ACTION_LEN})",
                    request.text.len()
                ),
            );
        }

        match self.store.execute(request) {
            Ok(ActionOutcome::Rows(mut rows)) => {
                let row_count = rows.len();
                rows.truncate(self.preview_rows);
                debug!(row_count, "action returned rows");
                ActionResult {
                    request: request.clone(),
                    success: true,
                    rows,
                    row_count,
                    affected: None,
                    error: None,
                }
            }
            Ok(ActionOutcome::Affected(n)) => {
                debug!(affected = n, "write action committed");
                ActionResult {
                    request: request.clone(),
                    success: true,
                    rows: Vec::new(),
                    row_count: 0,
                    affected: Some(n),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "action failed");
                ActionResult::failed(request.clone(), e.to_string())
            }
        }
    }

    /// Executes every action in order, isolating failures.
    #[must_use]
    pub fn execute_all(&self, requests: &[ActionRequest]) -> Vec<ActionResult> {
        requests.iter().map(|r| self.execute(r)).collect()
    }
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("preview_rows", &self.preview_rows)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use crate::storage::ingest::NewCompany;

    fn setup_executor(companies: usize) -> ActionExecutor {
        let store = SqliteStore::in_memory().unwrap_or_else(|e| panic!("in_memory: {e}"));
        store.init().unwrap_or_else(|e| panic!("init: {e}"));
        let rows: Vec<NewCompany> = (0..companies)
            .map(|i| NewCompany {
                company_name: format!("Company {i}"),
                ..NewCompany::default()
            })
            .collect();
        store
            .replace_companies(&rows)
            .unwrap_or_else(|e| panic!("replace: {e}"));
        ActionExecutor::new(Arc::new(store), 5)
    }

    #[test]
    fn test_preview_truncates_but_counts_all() {
        let executor = setup_executor(8);
        let result = executor.execute(&ActionRequest::new("SELECT * FROM companies"));
        assert!(result.success);
        assert_eq!(result.row_count, 8);
        assert_eq!(result.rows.len(), 5);
        assert_eq!(result.truncated_rows(), 3);
    }

    #[test]
    fn test_failure_does_not_abort_batch() {
        let executor = setup_executor(2);
        let results = executor.execute_all(&[
            ActionRequest::new("SELECT COUNT(*) AS n FROM companies"),
            ActionRequest::new("SELECT * FROM no_such_table"),
            ActionRequest::new("UPDATE companies SET website = 'x'"),
        ]);

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert_eq!(results[0].rows[0]["n"], 2);
        assert!(!results[1].success);
        assert!(
            results[1]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("no_such_table"))
        );
        assert!(results[2].success);
        assert_eq!(results[2].affected, Some(2));
    }

    #[test]
    fn test_oversized_action_rejected() {
        let executor = setup_executor(0);
        let huge = format!("SELECT '{}'", "x".repeat(MAX_ACTION_LEN));
        let result = executor.execute(&ActionRequest::new(huge));
        assert!(!result.success);
        assert!(result.error.as_deref().is_some_and(|e| e.contains("too large")));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let executor = setup_executor(1);
        let result = executor.execute(&ActionRequest::new(
            "INSERT INTO companies (company_name) VALUES (NULL)",
        ));
        assert!(!result.success);
        let count = executor.execute(&ActionRequest::new("SELECT COUNT(*) AS n FROM companies"));
        assert_eq!(count.rows[0]["n"], 1);
    }
}
