//! Keyword extraction agent.
//!
//! First stage of the match pipeline: turns one incentive into a list of
//! search keywords.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::TokenUsage;
use super::parse::parse_json_list;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::core::{Incentive, StageOutcome};

/// Maximum keywords kept from one response.
const MAX_KEYWORDS: usize = 50;

/// Agent that extracts search keywords from an incentive.
pub struct KeywordAgent {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: String,
}

impl KeywordAgent {
    /// Creates a keyword agent with the given system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt,
        }
    }

    /// Builds the user message describing the incentive.
    #[must_use]
    pub fn build_message(incentive: &Incentive) -> String {
        let field = |v: &Option<String>| v.as_deref().unwrap_or("N/A").to_string();
        format!(
            "Incentive data:\nTitle: {}\nDescription: {}\nAI Description: {}",
            field(&incentive.title),
            field(&incentive.description),
            field(&incentive.ai_description)
        )
    }

    /// Extracts keywords for `incentive`.
    ///
    /// Provider failures yield [`StageOutcome::Failed`]. Unparsable output
    /// is logged and yields [`StageOutcome::Empty`].
    pub async fn extract(
        &self,
        provider: &dyn LlmProvider,
        incentive: &Incentive,
        usage: &mut TokenUsage,
    ) -> StageOutcome<Vec<String>> {
        let response = match self.execute(provider, &Self::build_message(incentive)).await {
            Ok(response) => response,
            Err(e) => return StageOutcome::Failed(format!("keyword extraction failed: {e}")),
        };
        usage.accumulate(&response.usage);

        match parse_keywords(&response.content) {
            Some(keywords) => {
                debug!(incentive_id = incentive.incentive_id, count = keywords.len(), "keywords extracted");
                StageOutcome::from_vec(keywords)
            }
            None => {
                warn!(
                    incentive_id = incentive.incentive_id,
                    "keyword response was not a JSON list, treating as empty"
                );
                StageOutcome::Empty
            }
        }
    }
}

/// Parses a keyword list, trimming entries and dropping blanks and
/// case-insensitive duplicates.
///
/// Returns `None` if the content is not a JSON list of strings.
#[must_use]
pub fn parse_keywords(content: &str) -> Option<Vec<String>> {
    let raw: Vec<String> = parse_json_list(content, "keywords").ok()?;
    let mut seen = std::collections::HashSet::new();
    Some(
        raw.into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .filter(|k| seen.insert(k.to_lowercase()))
            .take(MAX_KEYWORDS)
            .collect(),
    )
}

#[async_trait]
impl Agent for KeywordAgent {
    fn name(&self) -> &'static str {
        "keywords"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incentive() -> Incentive {
        Incentive {
            incentive_id: 3,
            title: Some("Apoio à logística".to_string()),
            description: None,
            ai_description: Some("Financia frotas de transporte".to_string()),
            document_urls: None,
            publication_date: None,
            start_date: None,
            end_date: None,
            total_budget: None,
            source_link: None,
        }
    }

    #[test]
    fn test_build_message() {
        let msg = KeywordAgent::build_message(&incentive());
        assert_eq!(
            msg,
            "Incentive data:\nTitle: Apoio à logística\nDescription: N/A\nAI Description: Financia frotas de transporte"
        );
    }

    #[test]
    fn test_parse_keywords_cleans() {
        let parsed = parse_keywords(r#"[" logística ", "", "Logística", "transporte"]"#);
        assert_eq!(parsed, Some(vec!["logística".to_string(), "transporte".to_string()]));
    }

    #[test]
    fn test_parse_keywords_malformed() {
        assert_eq!(parse_keywords("Here are some keywords: logistics"), None);
        assert_eq!(parse_keywords("[1, 2]"), None);
    }
}
