//! Model-driven orchestration for querybot.
//!
//! Two modes share one provider abstraction backed by OpenAI-compatible
//! APIs:
//!
//! ```text
//! Interactive chat:
//!   user message → Orchestrator
//!     ├── model call (system prompt + recent history)
//!     ├── ActionExtractor → fenced SQL actions
//!     ├── ActionExecutor → rows / affected counts / errors
//!     └── ContextBuilder → decision turn → next model call (bounded)
//!
//! Batch matching:
//!   incentive → MatchPipeline
//!     ├── KeywordAgent (model)
//!     ├── search::search_candidates (full-text, no model)
//!     └── RankingAgent (model) → validated top-K
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod conversation;
pub mod executor;
pub mod extractor;
pub mod keywords;
pub mod message;
pub mod orchestrator;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod ranking;
pub mod traits;

// Re-export key types
pub use client::create_provider;
pub use config::{AgentConfig, AgentConfigBuilder};
pub use conversation::Conversation;
pub use executor::{ActionExecutor, ActionResult};
pub use extractor::{ActionExtractor, FencedActionExtractor};
pub use message::{ChatRequest, ChatResponse, Role, TokenUsage, Turn};
pub use orchestrator::{ChatReply, IterationRecord, Orchestrator};
pub use pipeline::{MatchPipeline, MatchReport, MatchResult, Stage};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use traits::{Agent, AgentResponse};
