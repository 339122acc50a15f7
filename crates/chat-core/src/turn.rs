//! Turn Loop
//!
//! Drives one user turn through as many model rounds as the model needs:
//!
//! ```text
//! AWAITING_MODEL ──request──▶ STREAMING ──tool-call-ready──▶ TOOL_EXECUTING
//!       ▲                        │  ▲                              │
//!       │                        │  └──────────result──────────────┘
//!       └──── finish: tool_calls ┤
//!                                └──── finish: stop / other ──▶ TURN_DONE
//! ```
//!
//! Chunks are handled strictly in arrival order. A tool runs to completion
//! before the next chunk is looked at; chunks for other calls wait in the
//! provider stream meanwhile.
//!
//! Tool schemas are offered only while the conversation has at most one
//! consecutive tool failure. Any success resets the count, so tools come back
//! on the very next request.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;

use crate::assembler::{AssemblerEvent, StreamAssembler};
use crate::error::{ChatError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{FinishReason, LlmProvider, ModelRequest};
use crate::tool::{ToolCall, ToolRegistry, ToolResult, run_tool};

/// Tools stay offered while consecutive failures are at or below this
pub const MAX_TOLERATED_TOOL_FAILURES: u32 = 1;

/// Turn loop configuration
#[derive(Clone, Debug)]
pub struct TurnConfig {
    /// Maximum model rounds within one turn
    pub max_rounds: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self { max_rounds: 25 }
    }
}

/// Where a turn currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    AwaitingModel,
    Streaming,
    ToolExecuting,
    Done,
}

/// Receives everything the user should see while a turn runs
pub trait TurnSink {
    /// A text fragment from the model
    fn text(&mut self, fragment: &str);

    /// A non-fatal anomaly
    fn warning(&mut self, message: &str);

    fn state_changed(&mut self, _state: TurnState) {}

    fn tool_started(&mut self, _call: &ToolCall) {}

    fn tool_finished(&mut self, _result: &ToolResult) {}
}

/// Summary of a completed turn
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Last assistant message of the conversation, the turn's visible result
    pub reply: Option<String>,

    /// Model rounds used
    pub rounds: usize,

    /// Tool calls that fired
    pub tool_calls: usize,

    /// Finish reason of the final round
    pub finish_reason: FinishReason,
}

/// The streaming tool-call orchestration loop
pub struct TurnLoop {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: TurnConfig,
}

impl TurnLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: TurnConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, TurnConfig::default())
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// Whether the next request for `conversation` carries tool schemas
    pub fn tools_offered(&self, conversation: &Conversation) -> bool {
        conversation.tools_enabled()
            && conversation.tool_failures() <= MAX_TOLERATED_TOOL_FAILURES
            && !self.tools.is_empty()
    }

    /// Build the request for the next round
    pub fn build_request(&self, conversation: &Conversation) -> ModelRequest {
        ModelRequest {
            model: conversation.model().to_string(),
            messages: conversation.messages().to_vec(),
            tools: self
                .tools_offered(conversation)
                .then(|| self.tools.export_schemas()),
        }
    }

    /// Run one user turn to completion.
    ///
    /// Messages are appended only at round boundaries, so dropping this
    /// future (e.g. on Ctrl-C) leaves the history consistent.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        input: &str,
        sink: &mut dyn TurnSink,
    ) -> Result<TurnOutcome> {
        if input.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        conversation.push(Message::user(input));

        let mut rounds = 0;
        let mut tool_calls = 0;

        loop {
            if rounds >= self.config.max_rounds {
                return Err(ChatError::MaxRounds(self.config.max_rounds));
            }
            rounds += 1;

            sink.state_changed(TurnState::AwaitingModel);
            let request = self.build_request(conversation);
            tracing::debug!(
                provider = self.provider.name(),
                model = %request.model,
                messages = request.messages.len(),
                tools = request.offers_tools(),
                round = rounds,
                "Requesting model round"
            );

            let round = self.stream_round(conversation, &request, sink).await?;
            tool_calls += round.tool_calls;

            if !round.text.is_empty() {
                conversation.push(Message::assistant(round.text));
            }
            if !round.results.is_empty() {
                conversation.push(Message::system(tool_results_message(&round.results)?));
            }

            match round.finish_reason {
                FinishReason::ToolCalls => {}
                FinishReason::Stop => {
                    return Ok(self.finish(
                        conversation,
                        rounds,
                        tool_calls,
                        FinishReason::Stop,
                        sink,
                    ));
                }
                other => {
                    tracing::warn!(reason = %other, "Round ended with unexpected finish reason");
                    sink.warning(&format!("Chat stopped unexpectedly. Reason: {other}"));
                    return Ok(self.finish(conversation, rounds, tool_calls, other, sink));
                }
            }
        }
    }

    async fn stream_round(
        &self,
        conversation: &mut Conversation,
        request: &ModelRequest,
        sink: &mut dyn TurnSink,
    ) -> Result<RoundOutput> {
        let mut stream = self.provider.complete_stream(request).await?;
        sink.state_changed(TurnState::Streaming);

        let mut assembler = StreamAssembler::new();
        let mut results = BTreeMap::new();
        let mut tool_calls = 0;

        let finish_reason = loop {
            let Some(chunk) = stream.next().await else {
                break FinishReason::Other("stream ended without a finish reason".into());
            };

            match assembler.push(chunk?) {
                None => {}
                Some(AssemblerEvent::TextAppended(fragment)) => sink.text(&fragment),
                Some(AssemblerEvent::ToolCallReady { index, call }) => {
                    tracing::debug!(index, tool = %call.name, "Tool call ready");
                    sink.state_changed(TurnState::ToolExecuting);
                    let result = self.execute_tool(conversation, &call, sink).await;
                    results.insert(call.name.to_lowercase(), result.payload);
                    tool_calls += 1;
                    sink.state_changed(TurnState::Streaming);
                }
                Some(AssemblerEvent::RoundFinished(reason)) => break reason,
            }
        };

        Ok(RoundOutput {
            text: assembler.take_text(),
            results,
            tool_calls,
            finish_reason,
        })
    }

    /// Look up and run one tool, updating the failure counter
    async fn execute_tool(
        &self,
        conversation: &mut Conversation,
        call: &ToolCall,
        sink: &mut dyn TurnSink,
    ) -> ToolResult {
        sink.tool_started(call);

        let result = match self.tools.lookup(&call.name) {
            Some(tool) => run_tool(tool.as_ref(), call).await,
            None => ToolResult::failure(
                &call.name,
                ChatError::ToolNotFound(call.name.clone()).to_string(),
            ),
        };

        if result.success {
            conversation.record_tool_success();
        } else {
            conversation.record_tool_failure();
            tracing::warn!(
                tool = %call.name,
                error = result.error.as_deref().unwrap_or_default(),
                failures = conversation.tool_failures(),
                "Tool call failed"
            );
        }

        sink.tool_finished(&result);
        result
    }

    fn finish(
        &self,
        conversation: &Conversation,
        rounds: usize,
        tool_calls: usize,
        finish_reason: FinishReason,
        sink: &mut dyn TurnSink,
    ) -> TurnOutcome {
        sink.state_changed(TurnState::Done);
        tracing::debug!(rounds, tool_calls, reason = %finish_reason, "Turn done");

        TurnOutcome {
            reply: conversation.last_assistant().map(String::from),
            rounds,
            tool_calls,
            finish_reason,
        }
    }
}

struct RoundOutput {
    text: String,
    results: BTreeMap<String, Value>,
    tool_calls: usize,
    finish_reason: FinishReason,
}

/// System message content that folds one round's tool results back in
pub fn tool_results_message(results: &BTreeMap<String, Value>) -> Result<String> {
    Ok(format!(
        "Tool results:\n{}\n\nPlease incorporate this information in your response.",
        serde_json::to_string_pretty(results)?
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::message::Role;
    use crate::provider::{ChunkStream, ModelInfo, StreamChunk};
    use crate::session::SessionId;
    use crate::tool::{ParameterSchema, Tool, ToolSchema};

    /// Replays pre-recorded rounds and remembers every request
    struct ScriptedProvider {
        rounds: Mutex<VecDeque<Vec<Result<StreamChunk>>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedProvider {
        fn new(rounds: Vec<Vec<Result<StreamChunk>>>) -> Arc<Self> {
            Arc::new(Self {
                rounds: Mutex::new(rounds.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete_stream(&self, request: &ModelRequest) -> Result<ChunkStream> {
            self.requests.lock().unwrap().push(request.clone());
            let chunks = self
                .rounds
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ChatError::Provider("script exhausted".into()))?;
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    /// Sends its chunks, then never yields again
    struct StallingProvider {
        chunks: Mutex<Vec<Result<StreamChunk>>>,
    }

    #[async_trait]
    impl LlmProvider for StallingProvider {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete_stream(&self, _request: &ModelRequest) -> Result<ChunkStream> {
            let chunks = std::mem::take(&mut *self.chunks.lock().unwrap());
            Ok(Box::pin(futures::stream::iter(chunks).chain(futures::stream::pending())))
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    struct SearchStub;

    #[async_trait]
    impl Tool for SearchStub {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "Search".into(),
                description: "Search the web for information.".into(),
                parameters: vec![ParameterSchema::required("query", "string", "The search query.")],
                has_side_effects: false,
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<Value> {
            let query = call.arguments["query"].as_str().unwrap_or("");
            Ok(json!({ "title": format!("About {query}") }))
        }
    }

    struct FlakyStub;

    #[async_trait]
    impl Tool for FlakyStub {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "Flaky".into(),
                description: "Always reports an error".into(),
                parameters: vec![],
                has_side_effects: false,
            }
        }

        async fn execute(&self, _call: &ToolCall) -> Result<Value> {
            Ok(json!({ "error": "upstream unavailable" }))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        text: String,
        warnings: Vec<String>,
        started: Vec<String>,
        states: Vec<TurnState>,
    }

    impl TurnSink for RecordingSink {
        fn text(&mut self, fragment: &str) {
            self.text.push_str(fragment);
        }

        fn warning(&mut self, message: &str) {
            self.warnings.push(message.to_string());
        }

        fn state_changed(&mut self, state: TurnState) {
            self.states.push(state);
        }

        fn tool_started(&mut self, call: &ToolCall) {
            self.started.push(call.name.clone());
        }
    }

    fn text(t: &str) -> Result<StreamChunk> {
        Ok(StreamChunk::Text(t.into()))
    }

    fn delta(index: u32, name: Option<&str>, arguments: &str) -> Result<StreamChunk> {
        Ok(StreamChunk::ToolCallDelta {
            index,
            name: name.map(String::from),
            arguments: arguments.into(),
        })
    }

    fn finish(reason: &str) -> Result<StreamChunk> {
        Ok(StreamChunk::Finish(FinishReason::parse(reason)))
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(SearchStub);
        registry.register(FlakyStub);
        Arc::new(registry)
    }

    fn conversation() -> Conversation {
        Conversation::new(SessionId::new(), "gpt-4o-mini", "You are a chat AI assistant.")
    }

    #[tokio::test]
    async fn stop_round_appends_single_assistant_message() {
        let provider = ScriptedProvider::new(vec![vec![text("Hel"), text("lo"), finish("stop")]]);
        let turn = TurnLoop::with_defaults(provider.clone(), registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let outcome = turn.run(&mut conv, "Hi", &mut sink).await.unwrap();

        assert_eq!(conv.len(), 3);
        assert_eq!(
            serde_json::to_value(conv.last().unwrap()).unwrap(),
            json!({"role": "assistant", "content": "Hello"})
        );
        assert_eq!(outcome.reply.as_deref(), Some("Hello"));
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        assert_eq!(sink.text, "Hello");
        assert_eq!(sink.states.last(), Some(&TurnState::Done));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn tool_round_folds_results_and_requeries() {
        let provider = ScriptedProvider::new(vec![
            vec![
                text("Let me look that up."),
                delta(0, Some("Search"), "{\"q"),
                delta(0, None, "uery\": \"x\"}"),
                finish("tool_calls"),
            ],
            vec![text("x is a letter."), finish("stop")],
        ]);
        let turn = TurnLoop::with_defaults(provider.clone(), registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let outcome = turn.run(&mut conv, "What is x?", &mut sink).await.unwrap();

        let roles: Vec<_> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::System, Role::Assistant]
        );
        let results = &conv.messages()[3].content;
        assert!(results.starts_with("Tool results:\n"));
        assert!(results.contains("\"search\""));
        assert!(results.contains("About x"));
        assert!(results.ends_with("Please incorporate this information in your response."));

        assert_eq!(sink.started, vec!["Search"]);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.reply.as_deref(), Some("x is a letter."));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[3].role, Role::System);
    }

    #[tokio::test]
    async fn consecutive_failures_suppress_tools_until_success() {
        let provider = ScriptedProvider::new(vec![
            vec![delta(0, Some("Flaky"), "{}"), finish("tool_calls")],
            vec![delta(0, Some("Flaky"), "{}"), finish("tool_calls")],
            vec![delta(0, Some("Search"), "{\"query\":\"rust\"}"), finish("tool_calls")],
            vec![text("Done."), finish("stop")],
        ]);
        let turn = TurnLoop::with_defaults(provider.clone(), registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        turn.run(&mut conv, "go", &mut sink).await.unwrap();

        let offered: Vec<_> = provider.requests().iter().map(ModelRequest::offers_tools).collect();
        assert_eq!(offered, vec![true, true, false, true]);
        assert_eq!(conv.tool_failures(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_and_streaming_continues() {
        let provider = ScriptedProvider::new(vec![
            vec![
                delta(0, Some("Weather"), "{\"city\":\"Oslo\"}"),
                text("Checking."),
                finish("tool_calls"),
            ],
            vec![text("Sorry."), finish("stop")],
        ]);
        let turn = TurnLoop::with_defaults(provider.clone(), registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        turn.run(&mut conv, "weather?", &mut sink).await.unwrap();

        assert_eq!(conv.tool_failures(), 1);
        assert_eq!(conv.messages()[2].content, "Checking.");
        assert!(conv.messages()[3].content.contains("Tool not found: Weather"));
        assert!(conv.messages()[3].content.contains("\"weather\""));
    }

    #[tokio::test]
    async fn same_tool_twice_in_a_round_keeps_last_result() {
        let provider = ScriptedProvider::new(vec![
            vec![
                delta(0, Some("Search"), "{\"query\":\"first\"}"),
                delta(1, Some("search"), "{\"query\":\"second\"}"),
                delta(2, Some("Search"), "{\"query\":\"third\"}"),
                finish("tool_calls"),
            ],
            vec![finish("stop")],
        ]);
        let turn = TurnLoop::with_defaults(provider, registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let outcome = turn.run(&mut conv, "search", &mut sink).await.unwrap();

        let results = &conv.messages()[2].content;
        assert!(results.contains("About third"));
        assert!(!results.contains("About first"));
        assert_eq!(outcome.tool_calls, 3);
        assert_eq!(outcome.reply, None);
    }

    #[tokio::test]
    async fn unexpected_finish_reason_warns_and_ends_turn() {
        let provider = ScriptedProvider::new(vec![vec![text("Partial"), finish("length")]]);
        let turn = TurnLoop::with_defaults(provider.clone(), registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let outcome = turn.run(&mut conv, "long story", &mut sink).await.unwrap();

        assert_eq!(outcome.finish_reason, FinishReason::Other("length".into()));
        assert_eq!(sink.warnings, vec!["Chat stopped unexpectedly. Reason: length"]);
        assert_eq!(conv.last_assistant(), Some("Partial"));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn stream_without_finish_chunk_ends_turn_with_warning() {
        let provider = ScriptedProvider::new(vec![vec![text("cut")]]);
        let turn = TurnLoop::with_defaults(provider, registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let outcome = turn.run(&mut conv, "hi", &mut sink).await.unwrap();

        assert!(matches!(outcome.finish_reason, FinishReason::Other(_)));
        assert_eq!(sink.warnings.len(), 1);
        assert_eq!(conv.last_assistant(), Some("cut"));
    }

    #[tokio::test]
    async fn disabled_tools_are_never_offered() {
        let provider = ScriptedProvider::new(vec![vec![text("ok"), finish("stop")]]);
        let turn = TurnLoop::with_defaults(provider.clone(), registry());
        let mut conv = conversation();
        conv.set_tools_enabled(false);
        let mut sink = RecordingSink::default();

        turn.run(&mut conv, "hi", &mut sink).await.unwrap();

        assert!(provider.requests()[0].tools.is_none());
    }

    #[tokio::test]
    async fn whitespace_input_is_not_a_turn() {
        let provider = ScriptedProvider::new(vec![]);
        let turn = TurnLoop::with_defaults(provider.clone(), registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let err = turn.run(&mut conv, "  \t\n", &mut sink).await.unwrap_err();

        assert!(matches!(err, ChatError::EmptyMessage));
        assert_eq!(conv.len(), 1);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn round_limit_stops_endless_tool_calls() {
        let round = || {
            vec![
                delta(0, Some("Search"), "{\"query\":\"again\"}"),
                finish("tool_calls"),
            ]
        };
        let provider = ScriptedProvider::new(vec![round(), round(), round()]);
        let turn = TurnLoop::new(provider, registry(), TurnConfig { max_rounds: 2 });
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let err = turn.run(&mut conv, "loop", &mut sink).await.unwrap_err();

        assert!(matches!(err, ChatError::MaxRounds(2)));
        // user + two tool-result messages stay committed
        assert_eq!(conv.len(), 4);
    }

    #[tokio::test]
    async fn stream_error_keeps_committed_history() {
        let provider = ScriptedProvider::new(vec![vec![
            text("partial"),
            Err(ChatError::Stream("connection reset".into())),
        ]]);
        let turn = TurnLoop::with_defaults(provider, registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let err = turn.run(&mut conv, "hi", &mut sink).await.unwrap_err();

        assert!(matches!(err, ChatError::Stream(_)));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn abandoned_turn_keeps_only_committed_history() {
        let provider = Arc::new(StallingProvider {
            chunks: Mutex::new(vec![text("Looking"), delta(0, Some("Flaky"), "{}")]),
        });
        let turn = TurnLoop::with_defaults(provider, registry());
        let mut conv = conversation();
        let mut sink = RecordingSink::default();

        let interrupted = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            turn.run(&mut conv, "hi", &mut sink),
        )
        .await;

        assert!(interrupted.is_err());
        let roles: Vec<_> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User]);
        // the tool that already ran still counts
        assert_eq!(conv.tool_failures(), 1);
        assert_eq!(sink.started, ["Flaky"]);
        assert_eq!(sink.text, "Looking");
    }
}
