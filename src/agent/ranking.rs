//! Candidate ranking agent.
//!
//! Last stage of the match pipeline: given one incentive and its search
//! candidates, asks the model for the most relevant candidate IDs.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::TokenUsage;
use super::parse::parse_json_list;
use super::prompt::fill_template;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::core::{Incentive, ScoredCompany, StageOutcome, crop_opt, crop_text};

/// Character limits applied to free-text fields before they are sent.
pub mod limits {
    /// Company name.
    pub const COMPANY_NAME: usize = 200;
    /// CAE activity label.
    pub const CAE_LABEL: usize = 200;
    /// Trade description.
    pub const TRADE_DESCRIPTION: usize = 500;
    /// Website.
    pub const WEBSITE: usize = 100;
    /// Incentive title.
    pub const TITLE: usize = 200;
    /// Incentive description.
    pub const DESCRIPTION: usize = 1000;
    /// Generated incentive summary.
    pub const AI_DESCRIPTION: usize = 1000;
}

/// Ranked IDs after checking them against the candidate set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedRanking {
    /// Known IDs, most relevant first, at most `top_k`.
    pub ids: Vec<i64>,
    /// Returned IDs that were not among the candidates.
    pub unknown: Vec<i64>,
}

/// Keeps the first `top_k` distinct IDs that belong to `candidates`.
///
/// Unknown IDs are collected rather than kept; duplicates are dropped.
#[must_use]
pub fn validate_ranking(raw: &[i64], candidates: &[ScoredCompany], top_k: usize) -> ValidatedRanking {
    let known: HashSet<i64> = candidates.iter().map(ScoredCompany::id).collect();
    let mut seen = HashSet::new();
    let mut result = ValidatedRanking::default();

    for &id in raw {
        if !known.contains(&id) {
            result.unknown.push(id);
        } else if result.ids.len() < top_k && seen.insert(id) {
            result.ids.push(id);
        }
    }
    result
}

/// Agent that ranks candidate companies for an incentive.
pub struct RankingAgent {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: String,
}

impl RankingAgent {
    /// Creates a ranking agent; `{top_k}` in the prompt is filled here.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: &str) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: fill_template(system_prompt, &[("top_k", &config.rank_top_k.to_string())]),
        }
    }

    /// Builds the user message with cropped incentive and candidate fields.
    #[must_use]
    pub fn build_message(incentive: &Incentive, candidates: &[ScoredCompany]) -> String {
        let cropped_incentive = json!({
            "incentive_id": incentive.incentive_id,
            "title": crop_opt(incentive.title.as_deref(), limits::TITLE),
            "description": crop_opt(incentive.description.as_deref(), limits::DESCRIPTION),
            "ai_description": crop_opt(incentive.ai_description.as_deref(), limits::AI_DESCRIPTION),
        });

        let cropped_candidates: Vec<serde_json::Value> = candidates
            .iter()
            .map(|c| {
                let company = &c.company;
                json!({
                    "id": company.id,
                    "company_name": crop_text(&company.company_name, limits::COMPANY_NAME),
                    "cae_primary_label": crop_opt(company.cae_primary_label.as_deref(), limits::CAE_LABEL),
                    "trade_description_native": crop_opt(
                        company.trade_description_native.as_deref(),
                        limits::TRADE_DESCRIPTION
                    ),
                    "website": crop_opt(company.website.as_deref(), limits::WEBSITE),
                })
            })
            .collect();

        let incentive_json = serde_json::to_string_pretty(&cropped_incentive).unwrap_or_default();
        let candidates_json = serde_json::to_string_pretty(&cropped_candidates).unwrap_or_default();
        format!("Incentive:\n{incentive_json}\n\nCandidates:\n{candidates_json}")
    }

    /// Asks the model to rank `candidates`, returning the raw ID list.
    ///
    /// Provider failures yield [`StageOutcome::Failed`]. Unparsable output
    /// is logged and yields [`StageOutcome::Empty`].
    pub async fn rank(
        &self,
        provider: &dyn LlmProvider,
        incentive: &Incentive,
        candidates: &[ScoredCompany],
        usage: &mut TokenUsage,
    ) -> StageOutcome<Vec<i64>> {
        let message = Self::build_message(incentive, candidates);
        let response = match self.execute(provider, &message).await {
            Ok(response) => response,
            Err(e) => return StageOutcome::Failed(format!("ranking failed: {e}")),
        };
        usage.accumulate(&response.usage);

        match parse_json_list::<i64>(&response.content, "ids") {
            Ok(ids) => {
                debug!(incentive_id = incentive.incentive_id, returned = ids.len(), "ranking parsed");
                StageOutcome::from_vec(ids)
            }
            Err(e) => {
                warn!(
                    incentive_id = incentive.incentive_id,
                    error = %e,
                    "ranking response unparsable, treating as empty"
                );
                StageOutcome::Empty
            }
        }
    }
}

#[async_trait]
impl Agent for RankingAgent {
    fn name(&self) -> &'static str {
        "ranking"
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
