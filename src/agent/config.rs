//! Agent configuration with builder pattern, environment variables and an
//! optional secrets file.
//!
//! Resolution order: explicit values → environment variables → secrets
//! file → defaults. The resulting [`AgentConfig`] is built once at startup
//! and passed by reference into the provider, orchestrator and pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AgentError;

/// Default completion model.
const DEFAULT_MODEL: &str = "gpt-4o";
/// Default maximum completion tokens.
const DEFAULT_MAX_TOKENS: u32 = 2000;
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.3;
/// Default cap on action-bearing iterations per chat message.
const DEFAULT_MAX_ITERATIONS: usize = 5;
/// Default number of recent history turns sent with each call.
const DEFAULT_HISTORY_WINDOW: usize = 10;
/// Default number of rows shown per action result.
const DEFAULT_PREVIEW_ROWS: usize = 5;
/// Default number of candidates passed to ranking.
const DEFAULT_SEARCH_LIMIT: usize = 25;
/// Default number of ranked identifiers kept per record.
const DEFAULT_RANK_TOP_K: usize = 5;
/// Default number of records processed concurrently.
const DEFAULT_MAX_CONCURRENCY: usize = 1;
/// Default per-record deadline in seconds.
const DEFAULT_RECORD_TIMEOUT_SECS: u64 = 300;

/// Configuration for the chat orchestrator and the match pipeline.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Completion model used by every call.
    pub model: String,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Action-bearing iterations allowed per chat message before the
    /// forced final answer.
    pub max_iterations: usize,
    /// Most-recent history turns included in each chat call.
    pub history_window: usize,
    /// Rows shown per action result in model feedback.
    pub preview_rows: usize,
    /// Candidates retrieved per record by the search stage.
    pub search_limit: usize,
    /// Ranked identifiers kept per record.
    pub rank_top_k: usize,
    /// Records processed concurrently by the match pipeline.
    pub max_concurrency: usize,
    /// Deadline for one record's full pipeline run.
    pub record_timeout: Duration,
    /// Minimum delay before each record's first model call.
    ///
    /// Applied after acquiring the concurrency permit.
    pub request_delay: Duration,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// On-disk secrets file.
#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    openai_api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    max_iterations: Option<usize>,
    history_window: Option<usize>,
    preview_rows: Option<usize>,
    search_limit: Option<usize>,
    rank_top_k: Option<usize>,
    max_concurrency: Option<usize>,
    record_timeout: Option<Duration>,
    request_delay: Option<Duration>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("QUERYBOT_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("QUERYBOT_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("QUERYBOT_BASE_URL"))
                .ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("QUERYBOT_MODEL").ok();
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parse("QUERYBOT_MAX_ITERATIONS");
        }
        if self.history_window.is_none() {
            self.history_window = env_parse("QUERYBOT_HISTORY_WINDOW");
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = env_parse("QUERYBOT_CONCURRENCY");
        }
        if self.record_timeout.is_none() {
            self.record_timeout =
                env_parse::<u64>("QUERYBOT_RECORD_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("QUERYBOT_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Populates unset credentials and model from a JSON secrets file.
    ///
    /// The file holds `openai_api_key` and optionally `base_url` and
    /// `model`; other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the file cannot be read or is not
    /// valid JSON.
    pub fn from_secrets_file(mut self, path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            message: format!("cannot read secrets file {}: {e}", path.display()),
        })?;
        let secrets: SecretsFile = serde_json::from_str(&raw).map_err(|e| AgentError::Config {
            message: format!("invalid secrets file {}: {e}", path.display()),
        })?;

        if self.api_key.is_none() {
            self.api_key = secrets.openai_api_key.filter(|k| !k.trim().is_empty());
        }
        if self.base_url.is_none() {
            self.base_url = secrets.base_url;
        }
        if self.model.is_none() {
            self.model = secrets.model;
        }
        Ok(self)
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the completion model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the maximum completion tokens.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the history window.
    #[must_use]
    pub const fn history_window(mut self, n: usize) -> Self {
        self.history_window = Some(n);
        self
    }

    /// Sets the rows shown per action result.
    #[must_use]
    pub const fn preview_rows(mut self, n: usize) -> Self {
        self.preview_rows = Some(n);
        self
    }

    /// Sets the candidate search limit.
    #[must_use]
    pub const fn search_limit(mut self, n: usize) -> Self {
        self.search_limit = Some(n);
        self
    }

    /// Sets the number of ranked identifiers kept.
    #[must_use]
    pub const fn rank_top_k(mut self, n: usize) -> Self {
        self.rank_top_k = Some(n);
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the per-record deadline.
    #[must_use]
    pub const fn record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = Some(timeout);
        self
    }

    /// Sets the delay applied before each record's first request.
    #[must_use]
    pub const fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// Zero values for counts that must be positive are clamped to 1.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS).max(1),
            history_window: self.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW).max(1),
            preview_rows: self.preview_rows.unwrap_or(DEFAULT_PREVIEW_ROWS),
            search_limit: self.search_limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1),
            rank_top_k: self.rank_top_k.unwrap_or(DEFAULT_RANK_TOP_K).max(1),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY).max(1),
            record_timeout: self
                .record_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_RECORD_TIMEOUT_SECS)),
            request_delay: self.request_delay.unwrap_or(Duration::ZERO),
            prompt_dir: self.prompt_dir,
        })
    }
}
