//! Candidate search for the batch matching pipeline.
//!
//! Two tiers:
//!
//! 1. One disjunctive full-text query over the filtered keyword tokens.
//! 2. If that returns fewer than half the requested limit, each token is
//!    queried on its own and the results are merged, keeping the best
//!    score per company.
//!
//! No model calls happen here.

pub mod terms;

use std::collections::HashMap;

use tracing::{debug, warn};

pub use terms::{STOP_WORDS, build_match_query, disjunction, filter_tokens, quote_term};

use crate::core::{ScoredCompany, StageOutcome};
use crate::storage::CandidateStore;

/// Searches for up to `limit` candidates matching `keywords`.
///
/// A failing primary query yields [`StageOutcome::Failed`]; failing
/// per-token fallback queries are logged and skipped.
pub fn search_candidates<S: AsRef<str>>(
    store: &dyn CandidateStore,
    keywords: &[S],
    limit: usize,
) -> StageOutcome<Vec<ScoredCompany>> {
    let tokens = filter_tokens(keywords);
    let Some(query) = build_match_query(keywords, &tokens) else {
        return StageOutcome::Empty;
    };

    let primary = match store.search_candidates(&query, limit) {
        Ok(found) => found,
        Err(e) => return StageOutcome::Failed(format!("candidate search failed: {e}")),
    };
    debug!(query = %query, found = primary.len(), limit, "primary candidate search");

    if primary.len() >= limit / 2 {
        return StageOutcome::from_vec(primary);
    }

    debug!(
        found = primary.len(),
        tokens = tokens.len(),
        "primary search under-delivered, querying tokens individually"
    );
    StageOutcome::from_vec(per_token_search(store, &tokens, limit))
}

/// Queries each token separately and merges by maximum score.
fn per_token_search(
    store: &dyn CandidateStore,
    tokens: &[String],
    limit: usize,
) -> Vec<ScoredCompany> {
    let mut best: HashMap<i64, ScoredCompany> = HashMap::new();

    for token in tokens {
        let found = match store.search_candidates(&quote_term(token), limit) {
            Ok(found) => found,
            Err(e) => {
                warn!(token = %token, error = %e, "per-token search failed");
                continue;
            }
        };
        for candidate in found {
            match best.get(&candidate.id()) {
                Some(existing) if existing.relevance_score >= candidate.relevance_score => {}
                _ => {
                    best.insert(candidate.id(), candidate);
                }
            }
        }
    }

    let mut merged: Vec<ScoredCompany> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.company.company_name.cmp(&b.company.company_name))
    });
    merged.truncate(limit);
    merged
}
