//! Action request and outcome types.

use serde::{Deserialize, Serialize};

/// A result row: column name → value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Leading keywords that mark an action as read-only.
const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "PRAGMA", "EXPLAIN", "VALUES"];

/// A unit of deterministic work extracted from model text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRequest {
    /// Verbatim action text (an SQL statement).
    pub text: String,
}

impl ActionRequest {
    /// Creates a request from action text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Classifies the action by its leading keyword.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        let keyword: String = self
            .text
            .trim_start()
            .trim_start_matches('(')
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect::<String>()
            .to_ascii_uppercase();

        if READ_KEYWORDS.contains(&keyword.as_str()) {
            ActionKind::Read
        } else {
            ActionKind::Write
        }
    }
}

/// Whether an action only reads or may mutate the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Returns rows, no side effects.
    Read,
    /// Mutates the store; committed on success.
    Write,
}

/// What the store produced for a successful action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Rows returned by a read action.
    Rows(Vec<Row>),
    /// Rows affected by a committed write action.
    Affected(usize),
}
