//! Three-way result of a pipeline stage.

use serde::Serialize;

/// Outcome of one batch pipeline stage.
///
/// "Nothing found" is an expected, frequent result and gets its own
/// variant rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum StageOutcome<T> {
    /// The stage produced a non-empty value.
    Found(T),
    /// The stage ran cleanly but produced nothing.
    Empty,
    /// The stage failed; carries a human-readable cause.
    Failed(String),
}

impl<U> StageOutcome<Vec<U>> {
    /// Wraps a collection, mapping an empty one to [`StageOutcome::Empty`].
    pub fn from_vec(items: Vec<U>) -> Self {
        if items.is_empty() {
            Self::Empty
        } else {
            Self::Found(items)
        }
    }
}

impl<T: Default> StageOutcome<T> {
    /// Returns the found value or `T::default()`.
    pub fn unwrap_or_default(self) -> T {
        match self {
            Self::Found(value) => value,
            Self::Empty | Self::Failed(_) => T::default(),
        }
    }
}
