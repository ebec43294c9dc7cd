//! Batch match pipeline.
//!
//! Runs every incentive through three stages:
//!
//! ```text
//! KeywordExtraction (model) → CandidateSearch (store) → Ranking (model) → Done
//! ```
//!
//! Records are independent. A bounded pool of tasks pulls records, each
//! under its own deadline, and sends its [`MatchResult`] back over a
//! channel; results are collected into a map keyed by incentive ID. A
//! failing stage ends that record with an `error` and empty downstream
//! fields, and the batch carries on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use super::config::AgentConfig;
use super::keywords::KeywordAgent;
use super::message::TokenUsage;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::ranking::{RankingAgent, validate_ranking};
use crate::core::{Incentive, ScoredCompany, StageOutcome};
use crate::error::AgentError;
use crate::search::search_candidates;
use crate::storage::CandidateStore;

/// Filename of the full results artifact.
pub const DEBUG_ARTIFACT: &str = "correspondence_debug.json";
/// Filename of the reduced results artifact.
pub const RESULTS_ARTIFACT: &str = "correspondence_results.json";

/// Error text when keyword extraction produced nothing.
const NO_KEYWORDS: &str = "No keywords extracted";
/// Error text when the search found no candidates.
const NO_CANDIDATES: &str = "No companies found";

/// Timed pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Stage {
    /// Model call producing keywords.
    #[serde(rename = "keyword_extraction_time")]
    KeywordExtraction,
    /// Full-text candidate search.
    #[serde(rename = "company_search_time")]
    CandidateSearch,
    /// Model call ranking candidates.
    #[serde(rename = "company_ranking_time")]
    Ranking,
    /// The whole record.
    #[serde(rename = "total_processing_time")]
    Total,
}

/// Outcome of one record.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// The record.
    pub incentive: Incentive,
    /// Extracted keywords.
    pub keywords: Vec<String>,
    /// Search candidates, most relevant first.
    pub candidates: Vec<ScoredCompany>,
    /// Ranked candidate IDs, most relevant first.
    pub ranked_ids: Vec<i64>,
    /// IDs the model returned that were not candidates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_ids: Vec<i64>,
    /// Why the record stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds spent per stage.
    pub timing: BTreeMap<Stage, f64>,
    /// Token usage across both model calls.
    pub usage: TokenUsage,
}

impl MatchResult {
    fn new(incentive: Incentive) -> Self {
        Self {
            incentive,
            keywords: Vec::new(),
            candidates: Vec::new(),
            ranked_ids: Vec::new(),
            unknown_ids: Vec::new(),
            error: None,
            timing: BTreeMap::new(),
            usage: TokenUsage::default(),
        }
    }

    fn record_timing(&mut self, stage: Stage, elapsed: Duration) {
        let secs = (elapsed.as_secs_f64() * 1000.0).round() / 1000.0;
        self.timing.insert(stage, secs);
    }

    fn finish(mut self, started: Instant) -> Self {
        self.record_timing(Stage::Total, started.elapsed());
        self
    }

    fn fail(mut self, message: impl Into<String>, started: Instant) -> Self {
        self.error = Some(message.into());
        self.finish(started)
    }

    /// Seconds spent in `stage`, zero if it did not run.
    #[must_use]
    pub fn stage_secs(&self, stage: Stage) -> f64 {
        self.timing.get(&stage).copied().unwrap_or(0.0)
    }

    /// Ranked candidates as `(id, name)` pairs, in rank order.
    #[must_use]
    pub fn ranked_companies(&self) -> Vec<MatchedCompany> {
        self.ranked_ids
            .iter()
            .filter_map(|id| self.candidates.iter().find(|c| c.id() == *id))
            .map(|c| MatchedCompany {
                id: c.id(),
                name: c.company.company_name.clone(),
            })
            .collect()
    }
}

/// Company reference in the reduced artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedCompany {
    /// Company ID.
    pub id: i64,
    /// Company name.
    pub name: String,
}

/// Reduced per-record artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ReducedResult {
    /// The record.
    pub incentive: Incentive,
    /// Extracted keywords.
    pub keywords: Vec<String>,
    /// Ranked companies.
    pub companies: Vec<MatchedCompany>,
}

/// Results of a pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    /// Per-record results keyed by incentive ID.
    pub results: BTreeMap<i64, MatchResult>,
    /// Token usage across the run.
    pub usage: TokenUsage,
    /// Wall-clock duration in seconds.
    pub elapsed_secs: f64,
}

impl MatchReport {
    /// Records without an error.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.error.is_none()).count()
    }

    /// Reduced artifact: error-free records with their ranked companies.
    #[must_use]
    pub fn reduced(&self) -> BTreeMap<i64, ReducedResult> {
        self.results
            .iter()
            .filter(|(_, r)| r.error.is_none())
            .map(|(id, r)| {
                (
                    *id,
                    ReducedResult {
                        incentive: r.incentive.clone(),
                        keywords: r.keywords.clone(),
                        companies: r.ranked_companies(),
                    },
                )
            })
            .collect()
    }

    /// Writes the full and reduced artifacts into `dir`.
    ///
    /// Returns the paths written (full, reduced).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or files cannot be written.
    pub fn save_artifacts(&self, dir: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)?;

        let debug_path = dir.join(DEBUG_ARTIFACT);
        let results_path = dir.join(RESULTS_ARTIFACT);
        std::fs::write(&debug_path, serde_json::to_vec_pretty(&self.results)?)?;
        std::fs::write(&results_path, serde_json::to_vec_pretty(&self.reduced())?)?;

        info!(
            debug = %debug_path.display(),
            results = %results_path.display(),
            "artifacts written"
        );
        Ok((debug_path, results_path))
    }
}

/// The batch matching pipeline.
#[derive(Clone)]
pub struct MatchPipeline {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn CandidateStore>,
    keyword_agent: Arc<KeywordAgent>,
    ranking_agent: Arc<RankingAgent>,
    search_limit: usize,
    rank_top_k: usize,
    max_concurrency: usize,
    record_timeout: Duration,
    request_delay: Duration,
}

impl MatchPipeline {
    /// Creates a pipeline from configuration and loaded prompts.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn CandidateStore>,
        config: &AgentConfig,
        prompts: &PromptSet,
    ) -> Self {
        Self {
            provider,
            store,
            keyword_agent: Arc::new(KeywordAgent::new(config, prompts.keywords.clone())),
            ranking_agent: Arc::new(RankingAgent::new(config, &prompts.ranking)),
            search_limit: config.search_limit,
            rank_top_k: config.rank_top_k,
            max_concurrency: config.max_concurrency.max(1),
            record_timeout: config.record_timeout,
            request_delay: config.request_delay,
        }
    }

    /// Runs every incentive in the store.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Storage`] if incentives cannot be listed.
    pub async fn run_all(&self, limit: Option<usize>) -> Result<MatchReport, AgentError> {
        let mut incentives = self.store.list_incentives()?;
        if let Some(limit) = limit {
            incentives.truncate(limit);
        }
        Ok(self.run(incentives).await)
    }

    /// Runs the given incentives through the pool.
    pub async fn run(&self, incentives: Vec<Incentive>) -> MatchReport {
        let started = Instant::now();
        let total = incentives.len();
        info!(records = total, concurrency = self.max_concurrency, "match run started");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let (tx, mut rx) = mpsc::channel::<MatchResult>(self.max_concurrency.max(1) * 2);
        let mut handles = Vec::with_capacity(total);
        let mut pending: BTreeMap<i64, Incentive> = BTreeMap::new();

        for incentive in incentives {
            pending.insert(incentive.incentive_id, incentive.clone());
            let pipeline = self.clone();
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();

            let id = incentive.incentive_id;
            let handle = tokio::spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return;
                };
                if !pipeline.request_delay.is_zero() {
                    tokio::time::sleep(pipeline.request_delay).await;
                }

                let result = pipeline.process_with_deadline(incentive).await;
                if tx.send(result).await.is_err() {
                    warn!(incentive_id = id, "result receiver dropped");
                }
            });
            handles.push((id, handle));
        }
        drop(tx);

        let mut report = MatchReport::default();
        while let Some(result) = rx.recv().await {
            let id = result.incentive.incentive_id;
            info!(
                incentive_id = id,
                done = report.results.len() + 1,
                total,
                error = result.error.as_deref().unwrap_or(""),
                "record processed"
            );
            report.usage.accumulate(&result.usage);
            pending.remove(&id);
            report.results.insert(id, result);
        }

        let mut task_errors: BTreeMap<i64, String> = BTreeMap::new();
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                error!(incentive_id = id, error = %e, "record task failed");
                task_errors.insert(id, e.to_string());
            }
        }
        for (id, incentive) in pending {
            let reason = task_errors
                .remove(&id)
                .unwrap_or_else(|| "no result produced".to_string());
            let err = AgentError::Orchestration {
                message: format!("record task failed: {reason}"),
            };
            let failed = MatchResult::new(incentive).fail(err.to_string(), started);
            report.results.insert(id, failed);
        }

        report.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            records = report.results.len(),
            succeeded = report.succeeded(),
            elapsed_secs = report.elapsed_secs,
            "match run finished"
        );
        report
    }

    async fn process_with_deadline(&self, incentive: Incentive) -> MatchResult {
        let started = Instant::now();
        let mut result = MatchResult::new(incentive);
        let outcome =
            tokio::time::timeout(self.record_timeout, self.run_stages(&mut result)).await;

        match outcome {
            Ok(Ok(())) => result.finish(started),
            Ok(Err(message)) => result.fail(message, started),
            Err(_) => {
                let err = AgentError::Timeout {
                    seconds: self.record_timeout.as_secs(),
                };
                warn!(
                    incentive_id = result.incentive.incentive_id,
                    error = %err,
                    completed_stages = result.timing.len(),
                    "record deadline exceeded"
                );
                result.fail(err.to_string(), started)
            }
        }
    }

    /// Fills `result` stage by stage.
    ///
    /// Each stage's timing and output are written as soon as the stage
    /// ends, so a caller that abandons this future still sees every stage
    /// that completed. Returns the error for the stage that stopped the
    /// record.
    async fn run_stages(&self, result: &mut MatchResult) -> Result<(), String> {
        debug!(
            incentive_id = result.incentive.incentive_id,
            title = result.incentive.label(),
            "processing record"
        );

        let stage_start = Instant::now();
        let keywords = self
            .keyword_agent
            .extract(self.provider.as_ref(), &result.incentive, &mut result.usage)
            .await;
        result.record_timing(Stage::KeywordExtraction, stage_start.elapsed());
        let keywords = match keywords {
            StageOutcome::Found(keywords) => keywords,
            StageOutcome::Empty => return Err(NO_KEYWORDS.to_string()),
            StageOutcome::Failed(message) => return Err(message),
        };
        result.keywords.clone_from(&keywords);

        let stage_start = Instant::now();
        let store = Arc::clone(&self.store);
        let limit = self.search_limit;
        let search = tokio::task::spawn_blocking(move || {
            search_candidates(store.as_ref(), &keywords, limit)
        })
        .await
        .unwrap_or_else(|e| {
            let err = AgentError::Orchestration {
                message: format!("search task failed: {e}"),
            };
            StageOutcome::Failed(err.to_string())
        });
        result.record_timing(Stage::CandidateSearch, stage_start.elapsed());
        result.candidates = match search {
            StageOutcome::Found(candidates) => candidates,
            StageOutcome::Empty => return Err(NO_CANDIDATES.to_string()),
            StageOutcome::Failed(message) => return Err(message),
        };

        let stage_start = Instant::now();
        let ranked = self
            .ranking_agent
            .rank(
                self.provider.as_ref(),
                &result.incentive,
                &result.candidates,
                &mut result.usage,
            )
            .await;
        result.record_timing(Stage::Ranking, stage_start.elapsed());
        match ranked {
            StageOutcome::Found(raw) => {
                let validated = validate_ranking(&raw, &result.candidates, self.rank_top_k);
                if !validated.unknown.is_empty() {
                    warn!(
                        incentive_id = result.incentive.incentive_id,
                        unknown = ?validated.unknown,
                        "ranking returned IDs outside the candidate set, dropped"
                    );
                }
                result.ranked_ids = validated.ids;
                result.unknown_ids = validated.unknown;
                Ok(())
            }
            StageOutcome::Empty => Ok(()),
            StageOutcome::Failed(message) => Err(message),
        }
    }
}

impl std::fmt::Debug for MatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchPipeline")
            .field("provider", &self.provider.name())
            .field("search_limit", &self.search_limit)
            .field("rank_top_k", &self.rank_top_k)
            .field("max_concurrency", &self.max_concurrency)
            .field("record_timeout", &self.record_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse};
    use crate::agent::prompt::KEYWORDS_PROMPT;
    use crate::storage::SqliteStore;
    use crate::storage::ingest::{NewCompany, NewIncentive};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Handler = dyn Fn(bool, &str) -> Result<String, String> + Send + Sync;

    /// Answers keyword and ranking calls through one handler:
    /// `(is_keyword_call, user_message)`.
    struct RoutingProvider {
        handler: Box<Handler>,
        keyword_delay: Duration,
        ranking_delay: Duration,
        call_count: AtomicUsize,
    }

    impl RoutingProvider {
        fn new(
            handler: impl Fn(bool, &str) -> Result<String, String> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Self::with_delays(handler, Duration::ZERO, Duration::ZERO)
        }

        fn with_delays(
            handler: impl Fn(bool, &str) -> Result<String, String> + Send + Sync + 'static,
            keyword_delay: Duration,
            ranking_delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(handler),
                keyword_delay,
                ranking_delay,
                call_count: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for RoutingProvider {
        fn name(&self) -> &'static str {
            "routing"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let is_keywords = request.messages[0].content == KEYWORDS_PROMPT;
            let delay = if is_keywords {
                self.keyword_delay
            } else {
                self.ranking_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let user = &request.messages[1].content;
            match (self.handler)(is_keywords, user) {
                Ok(content) => Ok(ChatResponse {
                    content,
                    usage: TokenUsage {
                        prompt_tokens: 1,
                        completion_tokens: 1,
                        total_tokens: 2,
                    },
                    finish_reason: Some("stop".to_string()),
                }),
                Err(message) => Err(AgentError::ApiRequest {
                    message,
                    status: Some(500),
                }),
            }
        }
    }

    fn setup_store(titles: &[&str]) -> Arc<SqliteStore> {
        let store = SqliteStore::in_memory().unwrap_or_else(|e| panic!("in_memory: {e}"));
        store.init().unwrap_or_else(|e| panic!("init: {e}"));
        let company = |name: &str, desc: &str| NewCompany {
            company_name: name.to_string(),
            trade_description_native: Some(desc.to_string()),
            ..NewCompany::default()
        };
        store
            .replace_companies(&[
                company("Rota Azul", "Transporte rodoviário de mercadorias"),
                company("ArmazéNorte", "Logística e armazenagem"),
                company("Frota Sul", "Transporte e logística urbana"),
                company("Doces Lda", "Pastelaria"),
            ])
            .unwrap_or_else(|e| panic!("companies: {e}"));
        let incentives: Vec<NewIncentive> = titles
            .iter()
            .map(|t| NewIncentive {
                title: Some((*t).to_string()),
                ..NewIncentive::default()
            })
            .collect();
        store
            .replace_incentives(&incentives)
            .unwrap_or_else(|e| panic!("incentives: {e}"));
        Arc::new(store)
    }

    fn config(concurrency: usize, timeout: Duration) -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .max_concurrency(concurrency)
            .record_timeout(timeout)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn pipeline(
        provider: Arc<RoutingProvider>,
        store: Arc<SqliteStore>,
        config: &AgentConfig,
    ) -> MatchPipeline {
        MatchPipeline::new(provider, store, config, &PromptSet::defaults())
    }

    fn logistics_handler(is_keywords: bool, user: &str) -> Result<String, String> {
        if is_keywords {
            if user.contains("Broken") {
                Ok("I could not decide on keywords.".to_string())
            } else {
                Ok(r#"["logística", "transporte", "armazenagem"]"#.to_string())
            }
        } else {
            Ok("[3, 99, 2, 3]".to_string())
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let store = setup_store(&["Broken incentive", "Apoio à logística"]);
        let provider = RoutingProvider::new(logistics_handler);
        let report = pipeline(provider, Arc::clone(&store), &config(1, Duration::from_secs(30)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));

        assert_eq!(report.results.len(), 2);

        let broken = &report.results[&1];
        assert_eq!(broken.error.as_deref(), Some(NO_KEYWORDS));
        assert!(broken.keywords.is_empty());
        assert!(broken.candidates.is_empty());
        assert!(broken.ranked_ids.is_empty());
        assert!(broken.timing.contains_key(&Stage::KeywordExtraction));
        assert!(broken.timing.contains_key(&Stage::Total));

        let ok = &report.results[&2];
        assert!(ok.error.is_none());
        assert_eq!(ok.keywords, vec!["logística", "transporte", "armazenagem"]);
        assert_eq!(ok.candidates.len(), 3);
        assert_eq!(ok.ranked_ids, vec![3, 2]);
        assert_eq!(ok.unknown_ids, vec![99]);
        assert_eq!(ok.timing.len(), 4);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.usage.total_tokens, 2 + 4);
    }

    #[tokio::test]
    async fn test_reduced_artifact_is_subset_of_candidates() {
        let store = setup_store(&["Apoio à logística", "Broken", "Frotas"]);
        let provider = RoutingProvider::new(logistics_handler);
        let report = pipeline(provider, store, &config(2, Duration::from_secs(30)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));

        let reduced = report.reduced();
        assert_eq!(reduced.len(), 2);
        assert!(!reduced.contains_key(&2));
        for (id, entry) in &reduced {
            let full = &report.results[id];
            let candidate_ids: HashSet<i64> = full.candidates.iter().map(ScoredCompany::id).collect();
            assert!(entry.companies.iter().all(|c| candidate_ids.contains(&c.id)));
            assert_eq!(entry.companies.len(), full.ranked_ids.len());
        }
        assert_eq!(reduced[&1].companies[0].name, "Frota Sul");
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let store = setup_store(&["Inovação"]);
        let provider = RoutingProvider::new(|is_keywords, _| {
            if is_keywords {
                Ok(r#"["aeroespacial", "satélites", "foguetes"]"#.to_string())
            } else {
                panic!("ranking must not run without candidates")
            }
        });
        let report = pipeline(provider, store, &config(1, Duration::from_secs(30)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));
        let result = &report.results[&1];
        assert_eq!(result.error.as_deref(), Some(NO_CANDIDATES));
        assert!(result.timing.contains_key(&Stage::CandidateSearch));
        assert!(!result.timing.contains_key(&Stage::Ranking));
    }

    #[tokio::test]
    async fn test_ranking_provider_error_recorded() {
        let store = setup_store(&["Apoio à logística"]);
        let provider = RoutingProvider::new(|is_keywords, _| {
            if is_keywords {
                Ok(r#"["logística", "transporte", "armazenagem"]"#.to_string())
            } else {
                Err("upstream unavailable".to_string())
            }
        });
        let report = pipeline(provider, store, &config(1, Duration::from_secs(30)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));
        let result = &report.results[&1];
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.contains("upstream unavailable"))
        );
        assert!(result.ranked_ids.is_empty());
        assert!(report.reduced().is_empty());
    }

    #[tokio::test]
    async fn test_record_deadline() {
        let store = setup_store(&["Slow", "Also slow"]);
        let provider = RoutingProvider::with_delays(
            |_, _| Ok(r#"["logística"]"#.to_string()),
            Duration::from_secs(10),
            Duration::from_secs(10),
        );
        let report = pipeline(provider, store, &config(2, Duration::from_millis(50)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));
        assert_eq!(report.results.len(), 2);
        for result in report.results.values() {
            assert!(
                result.error.as_deref().is_some_and(|e| e.contains("timed out")),
                "got {:?}",
                result.error
            );
        }
    }

    #[tokio::test]
    async fn test_deadline_keeps_completed_stages() {
        let store = setup_store(&["Apoio à logística"]);
        let provider = RoutingProvider::with_delays(
            logistics_handler,
            Duration::ZERO,
            Duration::from_secs(10),
        );
        let report = pipeline(provider, store, &config(1, Duration::from_millis(500)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));

        let result = &report.results[&1];
        assert!(result.error.as_deref().is_some_and(|e| e.contains("timed out")));
        assert_eq!(result.keywords, vec!["logística", "transporte", "armazenagem"]);
        assert_eq!(result.candidates.len(), 3);
        assert!(result.ranked_ids.is_empty());
        assert!(result.timing.contains_key(&Stage::KeywordExtraction));
        assert!(result.timing.contains_key(&Stage::CandidateSearch));
        assert!(!result.timing.contains_key(&Stage::Ranking));
        assert!(result.stage_secs(Stage::Total) >= 0.5);
        assert_eq!(result.usage.total_tokens, 2);
    }

    #[tokio::test]
    async fn test_keyword_provider_error_is_isolated() {
        let store = setup_store(&["Broken incentive", "Apoio à logística"]);
        let provider = RoutingProvider::new(|is_keywords, user| {
            if is_keywords && user.contains("Broken") {
                Err("connection reset".to_string())
            } else {
                logistics_handler(is_keywords, user)
            }
        });
        let report = pipeline(provider, store, &config(1, Duration::from_secs(30)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));

        let failed = &report.results[&1];
        assert!(
            failed
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("keyword extraction failed")
                    && e.contains("connection reset")),
            "got {:?}",
            failed.error
        );
        assert!(failed.keywords.is_empty());
        assert!(failed.candidates.is_empty());
        assert!(failed.ranked_ids.is_empty());
        assert_eq!(failed.usage.total_tokens, 0);

        let ok = &report.results[&2];
        assert!(ok.error.is_none());
        assert_eq!(ok.ranked_ids, vec![3, 2]);
        assert_eq!(report.reduced().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_run_processes_every_record() {
        let titles = ["a", "b", "c", "d", "e"];
        let store = setup_store(&titles);
        let provider = RoutingProvider::new(logistics_handler);
        let counter = Arc::clone(&provider);
        let report = pipeline(provider, store, &config(3, Duration::from_secs(30)))
            .run_all(Some(4))
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.succeeded(), 4);
        assert_eq!(counter.call_count.load(Ordering::SeqCst), 8);
        let ids: Vec<i64> = report.results.keys().copied().collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_save_artifacts() {
        let store = setup_store(&["Apoio à logística", "Broken"]);
        let provider = RoutingProvider::new(logistics_handler);
        let report = pipeline(provider, store, &config(1, Duration::from_secs(30)))
            .run_all(None)
            .await
            .unwrap_or_else(|e| panic!("run: {e}"));

        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let (debug_path, results_path) = report
            .save_artifacts(&dir.path().join("data"))
            .unwrap_or_else(|e| panic!("save: {e}"));

        let full: serde_json::Value =
            serde_json::from_slice(&std::fs::read(debug_path).unwrap_or_default())
                .unwrap_or_else(|e| panic!("parse: {e}"));
        assert_eq!(full["2"]["error"], NO_KEYWORDS);
        assert!(full["1"]["timing"]["keyword_extraction_time"].is_number());

        let reduced: serde_json::Value =
            serde_json::from_slice(&std::fs::read(results_path).unwrap_or_default())
                .unwrap_or_else(|e| panic!("parse: {e}"));
        assert!(reduced.get("2").is_none());
        assert_eq!(reduced["1"]["companies"][0]["id"], 3);
        assert_eq!(reduced["1"]["companies"][0]["name"], "Frota Sul");
    }
}
