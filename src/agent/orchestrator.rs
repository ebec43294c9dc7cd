//! Interactive chat orchestrator.
//!
//! Drives the model ⇄ action loop for one conversation:
//!
//! ```text
//! user turn → AwaitingModel ──(no actions)──────────────→ Terminal
//!                  │
//!               (actions)
//!                  ↓
//!              HasActions ──(empty feedback)────────────→ Terminal
//!                  │
//!          (decision turn appended)
//!                  ↓
//!   iteration < max ? AwaitingModel : forced final call → Terminal
//! ```
//!
//! Calls are strictly sequential. The loop makes at most
//! `max_iterations + 1` model calls per user message.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::config::AgentConfig;
use super::context::ContextBuilder;
use super::conversation::Conversation;
use super::executor::{ActionExecutor, ActionResult};
use super::extractor::{ActionExtractor, FencedActionExtractor};
use super::message::{ChatRequest, TokenUsage, Turn};
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use crate::error::AgentError;
use crate::storage::{ActionRequest, ActionStore};

/// One model call inside the loop and what came of it.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    /// 1-based call index; never exceeds the iteration cap.
    pub index: usize,
    /// Raw completion text.
    pub model_output: String,
    /// Actions extracted from the completion.
    pub extracted_requests: Vec<ActionRequest>,
    /// Results of those actions, in extraction order.
    pub results: Vec<ActionResult>,
    /// Whether this call ended the loop.
    pub is_terminal: bool,
}

/// The answer to one user message plus its audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    /// Natural-language answer shown to the user.
    pub answer: String,
    /// Loop iterations, in order.
    pub iterations: Vec<IterationRecord>,
    /// Whether the iteration cap forced a final call.
    pub forced_final: bool,
    /// Number of model calls made.
    pub model_calls: usize,
    /// Token usage summed across calls.
    pub usage: TokenUsage,
}

enum LoopState {
    AwaitingModel,
    HasActions {
        output: String,
        requests: Vec<ActionRequest>,
    },
    Terminal(String),
    ForceFinal,
}

/// Conversation-owning chat orchestrator.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    extractor: Box<dyn ActionExtractor>,
    executor: ActionExecutor,
    context: ContextBuilder,
    system_prompt: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_iterations: usize,
    history_window: usize,
    conversation: Conversation,
}

impl Orchestrator {
    /// Creates an orchestrator that extracts ```` ```sql ```` actions.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the extractor cannot be built.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn ActionStore>,
        config: &AgentConfig,
        prompts: &PromptSet,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            provider,
            extractor: Box::new(FencedActionExtractor::sql()?),
            executor: ActionExecutor::new(store, config.preview_rows),
            context: ContextBuilder::from_prompts(prompts),
            system_prompt: prompts.system.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_iterations: config.max_iterations.max(1),
            history_window: config.history_window.max(1),
            conversation: Conversation::new(),
        })
    }

    /// Replaces the action extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn ActionExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Full retained history.
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Answers one user message.
    ///
    /// Never fails: provider errors become a degraded textual answer and
    /// action errors are fed back to the model.
    pub async fn process_message(&mut self, message: &str) -> ChatReply {
        self.conversation.push(Turn::user(message));

        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut model_calls = 0usize;
        let mut completed = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let output = self.complete(&mut usage).await;
                    model_calls += 1;
                    let requests = self.extractor.extract(&output);
                    debug!(
                        iteration = completed + 1,
                        actions = requests.len(),
                        "model call complete"
                    );

                    if requests.is_empty() {
                        iterations.push(IterationRecord {
                            index: completed + 1,
                            model_output: output.clone(),
                            extracted_requests: Vec::new(),
                            results: Vec::new(),
                            is_terminal: true,
                        });
                        LoopState::Terminal(output)
                    } else {
                        LoopState::HasActions { output, requests }
                    }
                }

                LoopState::HasActions { output, requests } => {
                    let results = self.executor.execute_all(&requests);
                    completed += 1;
                    let failed = results.iter().filter(|r| !r.success).count();
                    debug!(
                        iteration = completed,
                        executed = results.len(),
                        failed,
                        "actions executed"
                    );

                    let decision = self.context.decision_turn(
                        &results,
                        message,
                        completed,
                        self.max_iterations,
                    );
                    let is_terminal = decision.is_none();
                    iterations.push(IterationRecord {
                        index: completed,
                        model_output: output.clone(),
                        extracted_requests: requests,
                        results,
                        is_terminal,
                    });

                    match decision {
                        None => LoopState::Terminal(output),
                        Some(turn) => {
                            self.conversation.push(Turn::user(turn));
                            if completed >= self.max_iterations {
                                LoopState::ForceFinal
                            } else {
                                LoopState::AwaitingModel
                            }
                        }
                    }
                }

                LoopState::ForceFinal => {
                    warn!(
                        max_iterations = self.max_iterations,
                        "iteration cap reached, forcing final answer"
                    );
                    let final_turn = self.context.final_turn(message, self.max_iterations);
                    self.conversation.push(Turn::user(final_turn));
                    let answer = self.complete(&mut usage).await;
                    model_calls += 1;

                    return ChatReply {
                        answer,
                        iterations,
                        forced_final: true,
                        model_calls,
                        usage,
                    };
                }

                LoopState::Terminal(answer) => {
                    info!(model_calls, iterations = iterations.len(), "message answered");
                    return ChatReply {
                        answer,
                        iterations,
                        forced_final: false,
                        model_calls,
                        usage,
                    };
                }
            };
        }
    }

    /// One model call over the system prompt and the recent history.
    ///
    /// The completion (or degraded error text) is appended as an assistant
    /// turn and returned.
    async fn complete(&mut self, usage: &mut TokenUsage) -> String {
        let mut messages = Vec::with_capacity(self.history_window + 1);
        messages.push(Turn::system(&self.system_prompt));
        messages.extend_from_slice(self.conversation.recent(self.history_window));

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            json_mode: false,
        };

        let content = match self.provider.chat(&request).await {
            Ok(response) => {
                usage.accumulate(&response.usage);
                response.content
            }
            Err(e) => {
                error!(error = %e, provider = self.provider.name(), "completion failed");
                format!("Error getting AI response: {e}")
            }
        };

        self.conversation.push(Turn::assistant(&content));
        content
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("max_iterations", &self.max_iterations)
            .field("history_window", &self.history_window)
            .field("turns", &self.conversation.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatResponse, Role};
    use crate::storage::SqliteStore;
    use crate::storage::ingest::NewCompany;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted completions; repeats the last one when exhausted.
    struct ScriptedProvider {
        responses: Vec<Result<String, String>>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                responses: responses
                    .into_iter()
                    .map(|r| r.map(String::from).map_err(String::from))
                    .collect(),
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        fn request(&self, n: usize) -> ChatRequest {
            self.requests
                .lock()
                .ok()
                .and_then(|r| r.get(n).cloned())
                .unwrap_or_else(|| panic!("no request {n}"))
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            if let Ok(mut r) = self.requests.lock() {
                r.push(request.clone());
            }
            let n = self.call_count.fetch_add(1, Ordering::SeqCst);
            let scripted = self
                .responses
                .get(n)
                .or_else(|| self.responses.last())
                .cloned()
                .unwrap_or_else(|| Ok(String::new()));
            match scripted {
                Ok(content) => Ok(ChatResponse {
                    content,
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15,
                    },
                    finish_reason: Some("stop".to_string()),
                }),
                Err(message) => Err(AgentError::ApiRequest {
                    message,
                    status: Some(429),
                }),
            }
        }
    }

    fn setup_store() -> Arc<SqliteStore> {
        let store = SqliteStore::in_memory().unwrap_or_else(|e| panic!("in_memory: {e}"));
        store.init().unwrap_or_else(|e| panic!("init: {e}"));
        store
            .replace_companies(&[
                NewCompany {
                    company_name: "Transportes Silva".to_string(),
                    ..NewCompany::default()
                },
                NewCompany {
                    company_name: "Padaria Central".to_string(),
                    ..NewCompany::default()
                },
            ])
            .unwrap_or_else(|e| panic!("replace: {e}"));
        Arc::new(store)
    }

    fn orchestrator(provider: Arc<ScriptedProvider>, max_iterations: usize) -> Orchestrator {
        let config = AgentConfig::builder()
            .api_key("test")
            .max_iterations(max_iterations)
            .build()
            .unwrap_or_else(|_| unreachable!());
        Orchestrator::new(provider, setup_store(), &config, &PromptSet::defaults())
            .unwrap_or_else(|e| panic!("orchestrator: {e}"))
    }

    const COUNT_QUERY: &str = "```sql\nSELECT COUNT(*) AS n FROM companies\n```";

    #[tokio::test]
    async fn test_direct_answer_single_call() {
        let provider = ScriptedProvider::new(vec![Ok("Hello! Ask me about companies.")]);
        let mut orch = orchestrator(Arc::clone(&provider), 5);

        let reply = orch.process_message("hi").await;
        assert_eq!(reply.answer, "Hello! Ask me about companies.");
        assert_eq!(provider.calls(), 1);
        assert_eq!(reply.iterations.len(), 1);
        assert!(reply.iterations[0].is_terminal);
        assert!(!reply.forced_final);
        assert_eq!(reply.usage.total_tokens, 15);
        assert_eq!(orch.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_action_then_answer() {
        let provider = ScriptedProvider::new(vec![Ok(COUNT_QUERY), Ok("There are 2 companies.")]);
        let mut orch = orchestrator(Arc::clone(&provider), 5);

        let reply = orch.process_message("How many companies?").await;
        assert_eq!(reply.answer, "There are 2 companies.");
        assert_eq!(provider.calls(), 2);
        assert_eq!(reply.iterations.len(), 2);
        assert_eq!(reply.iterations[0].index, 1);
        assert_eq!(reply.iterations[0].results[0].rows[0]["n"], 2);
        assert!(!reply.iterations[0].is_terminal);

        let second = provider.request(1);
        let feedback = second
            .messages
            .last()
            .unwrap_or_else(|| panic!("no messages"));
        assert_eq!(feedback.role, Role::User);
        assert!(feedback.content.contains("Query executed successfully (1 rows):"));
        assert!(feedback.content.contains("How many companies?"));
        assert!(feedback.content.contains("iteration 1 of at most 5"));
    }

    #[tokio::test]
    async fn test_iteration_cap_forces_final_call() {
        let provider = ScriptedProvider::new(vec![Ok(COUNT_QUERY)]);
        let mut orch = orchestrator(Arc::clone(&provider), 3);

        let reply = orch.process_message("loop forever").await;
        assert_eq!(provider.calls(), 4);
        assert_eq!(reply.model_calls, 4);
        assert!(reply.forced_final);
        assert_eq!(reply.iterations.len(), 3);
        assert!(reply.iterations.iter().all(|r| r.index <= 3));
        let indices: Vec<usize> = reply.iterations.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);

        let last = provider.request(3);
        let final_turn = last.messages.last().unwrap_or_else(|| panic!("no messages"));
        assert!(final_turn.content.contains("limit of 3 query rounds"));
        // The forced answer is returned verbatim, fences and all.
        assert_eq!(reply.answer, COUNT_QUERY);
    }

    #[tokio::test]
    async fn test_history_window_bounds_outbound_turns() {
        let provider = ScriptedProvider::new(vec![Ok("ok")]);
        let mut orch = orchestrator(Arc::clone(&provider), 5);

        for i in 0..6 {
            let _ = orch.process_message(&format!("message {i}")).await;
        }
        assert_eq!(orch.conversation().len(), 12);

        let _ = orch.process_message("message 6").await;
        let request = provider.request(6);
        assert_eq!(request.messages.len(), 11);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages.iter().all(|t| t.content != "message 0"));
        assert_eq!(
            request.messages.last().map(|t| t.content.as_str()),
            Some("message 6")
        );
        assert_eq!(orch.conversation().len(), 14);
        assert_eq!(orch.conversation().turns()[0].content, "message 0");
    }

    #[tokio::test]
    async fn test_zero_history_window_still_sends_current_turn() {
        let provider = ScriptedProvider::new(vec![Ok(COUNT_QUERY), Ok("There are 2 companies.")]);
        let mut config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        config.history_window = 0;
        let mut orch = Orchestrator::new(
            Arc::clone(&provider) as Arc<dyn LlmProvider>,
            setup_store(),
            &config,
            &PromptSet::defaults(),
        )
        .unwrap_or_else(|e| panic!("orchestrator: {e}"));

        let reply = orch.process_message("How many companies?").await;
        assert_eq!(reply.answer, "There are 2 companies.");

        let first = provider.request(0);
        let roles: Vec<Role> = first.messages.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(first.messages[1].content, "How many companies?");

        let second = provider.request(1);
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[1].role, Role::User);
        assert!(second.messages[1].content.contains("How many companies?"));
    }

    #[tokio::test]
    async fn test_failing_action_fed_back() {
        let provider = ScriptedProvider::new(vec![
            Ok("```sql\nSELECT 1 AS one\n```\n```sql\nSELECT * FROM missing\n```\n```sql\nSELECT 3 AS three\n```"),
            Ok("Done."),
        ]);
        let mut orch = orchestrator(Arc::clone(&provider), 5);

        let reply = orch.process_message("try things").await;
        let results = &reply.iterations[0].results;
        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[2].success);
        assert_eq!(results[2].rows[0]["three"], 3);

        let feedback = provider.request(1);
        let content = &feedback.messages.last().unwrap_or_else(|| panic!("empty")).content;
        assert!(content.contains("Query failed: no such table: missing"));
        assert_eq!(reply.answer, "Done.");
    }

    #[tokio::test]
    async fn test_provider_error_is_degraded_answer() {
        let provider = ScriptedProvider::new(vec![Err("rate limited")]);
        let mut orch = orchestrator(Arc::clone(&provider), 5);

        let reply = orch.process_message("anything").await;
        assert!(reply.answer.starts_with("Error getting AI response:"));
        assert!(reply.answer.contains("rate limited"));
        assert_eq!(provider.calls(), 1);
        assert_eq!(reply.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_custom_extractor() {
        struct NeverExtract;
        impl ActionExtractor for NeverExtract {
            fn extract(&self, _text: &str) -> Vec<ActionRequest> {
                Vec::new()
            }
        }

        let provider = ScriptedProvider::new(vec![Ok(COUNT_QUERY)]);
        let mut orch = orchestrator(Arc::clone(&provider), 5).with_extractor(Box::new(NeverExtract));
        let reply = orch.process_message("q").await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(reply.answer, COUNT_QUERY);
    }
}
