//! Action extraction from completion text.
//!
//! The orchestrator only depends on [`ActionExtractor`]; the fenced-block
//! parser here is one implementation.

use regex::{Regex, RegexBuilder};

use crate::error::AgentError;
use crate::storage::ActionRequest;

/// Parses a completion for embedded action directives.
pub trait ActionExtractor: Send + Sync {
    /// Returns the actions in `text`, in source order.
    ///
    /// Zero matches is an empty vector, not an error. Content is not
    /// validated here.
    fn extract(&self, text: &str) -> Vec<ActionRequest>;
}

/// Extracts the bodies of fenced code blocks tagged with a marker keyword,
/// e.g. ```` ```sql ... ``` ````.
///
/// The marker is matched case-insensitively; bodies are whitespace-trimmed
/// and empty bodies are dropped.
#[derive(Debug, Clone)]
pub struct FencedActionExtractor {
    pattern: Regex,
}

impl FencedActionExtractor {
    /// Marker used by the chat prompts.
    pub const SQL_MARKER: &'static str = "sql";

    /// Creates an extractor for fences tagged with `marker`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the pattern cannot be compiled.
    pub fn new(marker: &str) -> Result<Self, AgentError> {
        let pattern = RegexBuilder::new(&format!(r"```{}\s*(.*?)\s*```", regex::escape(marker)))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| AgentError::Config {
                message: format!("invalid action marker '{marker}': {e}"),
            })?;
        Ok(Self { pattern })
    }

    /// Creates an extractor for ```` ```sql ```` fences.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the pattern cannot be compiled.
    pub fn sql() -> Result<Self, AgentError> {
        Self::new(Self::SQL_MARKER)
    }
}

impl ActionExtractor for FencedActionExtractor {
    fn extract(&self, text: &str) -> Vec<ActionRequest> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|body| !body.is_empty())
            .map(ActionRequest::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn extractor() -> FencedActionExtractor {
        FencedActionExtractor::sql().unwrap_or_else(|_| unreachable!())
    }

    fn texts(actions: &[ActionRequest]) -> Vec<&str> {
        actions.iter().map(|a| a.text.as_str()).collect()
    }

    #[test]
    fn test_no_fences() {
        assert!(extractor().extract("There are 42 companies.").is_empty());
        assert!(extractor().extract("").is_empty());
    }

    #[test]
    fn test_multiple_fences_in_order() {
        let text = "First:\n```sql\nSELECT 1;\n```\nthen\n```SQL\n  SELECT 2  \n```\ndone";
        assert_eq!(texts(&extractor().extract(text)), vec!["SELECT 1;", "SELECT 2"]);
    }

    #[test]
    fn test_empty_fence_dropped() {
        let text = "```sql\n   \n```\n```sql SELECT 3```";
        assert_eq!(texts(&extractor().extract(text)), vec!["SELECT 3"]);
    }

    #[test]
    fn test_other_languages_ignored() {
        let text = "```python\nprint(1)\n```\n```\nSELECT 1\n```";
        assert!(extractor().extract(text).is_empty());
    }

    #[test]
    fn test_multiline_body_kept_verbatim() {
        let text = "```sql\nSELECT id,\n       company_name\nFROM companies\n```";
        assert_eq!(
            texts(&extractor().extract(text)),
            vec!["SELECT id,\n       company_name\nFROM companies"]
        );
    }

    proptest! {
        #[test]
        fn extracts_exactly_n_fences(bodies in prop::collection::vec("[A-Za-z0-9 ,*=()]{1,40}", 0..6)) {
            let bodies: Vec<String> = bodies
                .into_iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
            let text: String = bodies
                .iter()
                .map(|b| format!("prose\n```sql\n{b}\n```\n"))
                .collect();
            let extracted = extractor().extract(&text);
            prop_assert_eq!(texts(&extracted), bodies.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
