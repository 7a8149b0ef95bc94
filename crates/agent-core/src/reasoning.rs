//! Conversation Loop
//!
//! Drives the tool-calling exchange with the completion provider:
//!
//! ```text
//! Init ─► AwaitingModel ─► (no tool calls) ─► Done
//!              ▲    │
//!              │    ▼ (tool calls)
//!           ToolExecuting
//! ```
//!
//! Any error moves the run to `Failed` and is returned to the caller; no
//! partial answer is ever produced.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{Completion, GenerationOptions, LlmProvider};
use crate::stream;
use crate::tool::{Tool, ToolCall, ToolDescriptor, ToolRegistry, ToolResult};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Fixed system message placed first in every conversation
    pub system_prompt: String,

    /// Maximum provider round trips per run (`None` = unbounded)
    pub max_rounds: Option<usize>,

    /// Time budget for a single provider round trip
    pub round_timeout: Option<Duration>,

    /// Generation options
    pub generation: GenerationOptions,

    /// Dispatch the tool calls of one turn concurrently
    pub parallel_tool_calls: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_rounds: Some(10),
            round_timeout: Some(Duration::from_secs(120)),
            generation: GenerationOptions::default(),
            parallel_tool_calls: true,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Use the provided tools when you need data you do not have. Be concise and accurate.";

/// Where a run currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    AwaitingModel,
    ToolExecuting,
    Done,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::AwaitingModel => "awaiting_model",
            Self::ToolExecuting => "tool_executing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunOutcome {
    /// Final answer text
    pub answer: String,

    /// Full transcript, final assistant message included
    pub conversation: Conversation,

    /// Provider round trips made
    pub rounds: usize,

    /// Tool calls dispatched
    pub tool_calls: usize,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// Answer a question, returning the final text
    pub async fn ask(&self, question: &str) -> Result<String> {
        self.run_with_cancel(question, CancellationToken::new()).await
    }

    /// Answer a question; cancelling `cancel` aborts the in-flight round
    pub async fn run_with_cancel(&self, question: &str, cancel: CancellationToken) -> Result<String> {
        Ok(self.run_detailed(question, cancel).await?.answer)
    }

    /// Answer a question and return the whole transcript
    pub async fn run_detailed(&self, question: &str, cancel: CancellationToken) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("agent_run", %run_id, model = %self.config.generation.model);

        async {
            match self.drive(question, &cancel).await {
                Ok(outcome) => {
                    tracing::info!(
                        rounds = outcome.rounds,
                        tool_calls = outcome.tool_calls,
                        "Run finished"
                    );
                    Ok(outcome)
                }
                Err(e) => {
                    tracing::debug!(state = %RunState::Failed, "State transition");
                    tracing::warn!(error = %e, "Run failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, question: &str, cancel: &CancellationToken) -> Result<RunOutcome> {
        let mut state = RunState::Init;
        let mut conversation = Conversation::with_system_prompt(self.config.system_prompt.as_str());
        conversation.push(Message::user(question))?;

        let tools = self.tools.descriptors();
        let mut rounds = 0;
        let mut dispatched = 0;

        loop {
            if let Some(max) = self.config.max_rounds {
                if rounds >= max {
                    return Err(AgentError::MaxIterations(max));
                }
            }
            rounds += 1;

            transition(&mut state, RunState::AwaitingModel);
            let completion = self.request_round(&conversation, &tools, cancel).await?;

            if !completion.has_tool_calls() {
                transition(&mut state, RunState::Done);
                let answer = completion.content;
                conversation.push(Message::assistant(answer.as_str()))?;
                return Ok(RunOutcome {
                    answer,
                    conversation,
                    rounds,
                    tool_calls: dispatched,
                });
            }

            transition(&mut state, RunState::ToolExecuting);
            let calls = completion.tool_calls;
            tracing::debug!(round = rounds, count = calls.len(), "Model requested tools");

            conversation.push(Message::assistant_with_tool_calls(
                completion.content,
                calls.clone(),
            ))?;

            let results = tokio::select! {
                () = cancel.cancelled() => Err(AgentError::Cancelled),
                results = self.execute_calls(&calls) => results,
            }?;

            for result in results {
                conversation.push(result.into())?;
            }
            dispatched += calls.len();
        }
    }

    /// One provider round trip, bounded by the round timeout and `cancel`
    async fn request_round(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let bounded = async {
            match self.config.round_timeout {
                Some(limit) => tokio::time::timeout(limit, self.round_trip(conversation, tools))
                    .await
                    .unwrap_or(Err(AgentError::Timeout(limit))),
                None => self.round_trip(conversation, tools).await,
            }
        };

        // Losing either race drops the round trip future, closing any open stream.
        tokio::select! {
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            result = bounded => result,
        }
    }

    async fn round_trip(&self, conversation: &Conversation, tools: &[ToolDescriptor]) -> Result<Completion> {
        let options = &self.config.generation;
        let messages = conversation.messages();

        if options.stream {
            let stream = self.provider.complete_stream(messages, tools, options).await?;
            stream::collect(stream, &options.model).await
        } else {
            self.provider.complete(messages, tools, options).await
        }
    }

    /// Dispatch a batch; results come back in request order
    async fn execute_calls(&self, calls: &[ToolCall]) -> Result<Vec<ToolResult>> {
        // Reject the batch before running any of it
        if let Some(call) = calls.iter().find(|c| self.tools.get(&c.name).is_none()) {
            return Err(AgentError::UnsupportedTool(call.name.clone()));
        }

        if self.config.parallel_tool_calls && calls.len() > 1 {
            join_all(calls.iter().map(|call| self.tools.dispatch(call)))
                .await
                .into_iter()
                .collect()
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.tools.dispatch(call).await?);
            }
            Ok(results)
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn transition(state: &mut RunState, next: RunState) {
    tracing::debug!(from = %state, to = %next, "State transition");
    *state = next;
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn generation(mut self, options: GenerationOptions) -> Self {
        self.config.generation = options;
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub const fn stream(mut self, stream: bool) -> Self {
        self.config.generation.stream = stream;
        self
    }

    #[must_use]
    pub const fn max_rounds(mut self, max: Option<usize>) -> Self {
        self.config.max_rounds = max;
        self
    }

    #[must_use]
    pub const fn round_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.round_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.config.parallel_tool_calls = parallel;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        if self.config.max_rounds == Some(0) {
            return Err(AgentError::Config("max_rounds must be at least 1".into()));
        }
        if self.config.max_rounds.is_none() && self.config.round_timeout.is_none() {
            tracing::warn!("Agent has neither a round limit nor a round timeout");
        }

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::message::Role;
    use crate::mock::{MockError, MockProvider, MockResponse};
    use crate::provider::StreamDelta;
    use crate::tool::{ParameterSchema, ToolSchema};

    /// Echoes its input after `delay_ms`, counting invocations
    #[derive(Clone, Default)]
    struct SlowEcho {
        calls: Arc<AtomicUsize>,
    }

    #[derive(Deserialize)]
    struct SlowEchoArgs {
        text: String,
        #[serde(default)]
        delay_ms: u64,
    }

    #[async_trait]
    impl Tool for SlowEcho {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo text".into(),
                parameters: vec![ParameterSchema::required_string("text", "Text")],
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            let args: SlowEchoArgs = call.decode()?;
            tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args.text)
        }
    }

    fn echo_call(id: &str, text: &str, delay_ms: u64) -> ToolCall {
        ToolCall::new(id, "echo", json!({"text": text, "delay_ms": delay_ms}))
    }

    fn agent(mock: &MockProvider, tool: SlowEcho) -> AgentBuilder {
        AgentBuilder::new()
            .provider(Arc::new(mock.clone()))
            .system_prompt("sys")
            .tool(tool)
    }

    #[tokio::test]
    async fn test_answer_without_tools() {
        let mock = MockProvider::new();
        mock.queue_completion(Completion::text("Hello"));

        let agent = agent(&mock, SlowEcho::default()).build().unwrap();
        let outcome = agent.run_detailed("hi", CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.answer, "Hello");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.tool_calls, 0);

        let recorded = mock.recorded_calls();
        assert_eq!(recorded[0].messages[0].role, Role::System);
        assert_eq!(recorded[0].messages[1].content, "hi");
        assert_eq!(recorded[0].tools[0].name, "echo");
    }

    #[tokio::test]
    async fn test_one_tool_round_then_answer() {
        let mock = MockProvider::new();
        mock.queue_completion(Completion::with_tool_calls("", vec![echo_call("a", "x", 0)]));
        mock.queue_completion(Completion::text("final"));

        let tool = SlowEcho::default();
        let agent = agent(&mock, tool.clone()).build().unwrap();

        assert_eq!(agent.ask("q").await.unwrap(), "final");
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.call_count(), 2);

        let second = &mock.recorded_calls()[1].messages;
        assert_eq!(second.len(), 4);
        assert!(second[2].has_tool_calls());
        assert_eq!(second[3].role, Role::Tool);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("a"));
        assert_eq!(second[3].content, "x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_results_keep_request_order() {
        let mock = MockProvider::new();
        mock.queue_completion(Completion::with_tool_calls(
            "",
            vec![echo_call("a", "first", 50), echo_call("b", "second", 1)],
        ));
        mock.queue_completion(Completion::text("done"));

        let agent = agent(&mock, SlowEcho::default()).build().unwrap();
        agent.ask("q").await.unwrap();

        let messages = &mock.recorded_calls()[1].messages;
        let ids: Vec<_> = messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unsupported_tool_aborts() {
        let mock = MockProvider::new();
        mock.queue_completion(Completion::with_tool_calls(
            "",
            vec![echo_call("a", "x", 0), ToolCall::new("b", "unknown", json!({}))],
        ));
        mock.queue_completion(Completion::text("never"));

        let tool = SlowEcho::default();
        let agent = agent(&mock, tool.clone()).build().unwrap();
        let err = agent.ask("q").await.unwrap_err();

        assert!(matches!(err, AgentError::UnsupportedTool(name) if name == "unknown"));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_error_aborts() {
        let mock = MockProvider::new();
        mock.queue_error(MockError::Unavailable("down".into()));

        let agent = agent(&mock, SlowEcho::default()).build().unwrap();
        let err = agent.ask("q").await.unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_max_rounds() {
        let mock = MockProvider::new();
        for i in 0..3 {
            mock.queue_completion(Completion::with_tool_calls(
                "",
                vec![echo_call(&format!("c{i}"), "x", 0)],
            ));
        }

        let agent = agent(&mock, SlowEcho::default())
            .max_rounds(Some(2))
            .build()
            .unwrap();
        let err = agent.ask("q").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(2)));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_timeout() {
        let mock = MockProvider::new();
        mock.queue(MockResponse::Stall);

        let agent = agent(&mock, SlowEcho::default())
            .round_timeout(Some(Duration::from_secs(5)))
            .build()
            .unwrap();
        let err = agent.ask("q").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_round_timeout() {
        let mock = MockProvider::new();
        mock.queue(MockResponse::Stall);

        let agent = agent(&mock, SlowEcho::default())
            .stream(true)
            .round_timeout(Some(Duration::from_secs(1)))
            .build()
            .unwrap();
        let err = agent.ask("q").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let mock = MockProvider::new();
        mock.queue(MockResponse::Stall);

        let agent = agent(&mock, SlowEcho::default())
            .round_timeout(None)
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = agent.run_with_cancel("q", cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_streamed_tool_round() {
        let mock = MockProvider::new();
        mock.queue_stream(vec![
            StreamDelta::Text("Checking".into()),
            StreamDelta::ToolCallStart { id: "a".into(), name: "echo".into() },
            StreamDelta::ToolCallArguments { id: "a".into(), fragment: r#"{"te"#.into() },
            StreamDelta::ToolCallArguments { id: "a".into(), fragment: r#"xt":"hi"}"#.into() },
            StreamDelta::Done { finish_reason: None },
        ]);
        mock.queue_completion(Completion::text("streamed answer"));

        let agent = agent(&mock, SlowEcho::default()).stream(true).build().unwrap();
        let outcome = agent.run_detailed("q", CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.answer, "streamed answer");
        assert_eq!(outcome.tool_calls, 1);
        let messages = outcome.conversation.messages();
        assert_eq!(messages[2].content, "Checking");
        assert_eq!(messages[3].content, "hi");
        assert!(mock.recorded_calls().iter().all(|c| c.streamed));
    }

    #[tokio::test]
    async fn test_call_ids_reused_across_rounds() {
        let mock = MockProvider::new();
        mock.queue_completion(Completion::with_tool_calls("", vec![echo_call("call_0", "one", 0)]));
        mock.queue_completion(Completion::with_tool_calls("", vec![echo_call("call_0", "two", 0)]));
        mock.queue_completion(Completion::text("final"));

        let tool = SlowEcho::default();
        let agent = agent(&mock, tool.clone()).build().unwrap();
        let outcome = agent.run_detailed("q", CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.answer, "final");
        assert_eq!(outcome.rounds, 3);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 2);

        let results: Vec<_> = outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id.as_deref(), m.content.as_str()))
            .collect();
        assert_eq!(results, vec![(Some("call_0"), "one"), (Some("call_0"), "two")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_dispatch_keeps_request_order() {
        let mock = MockProvider::new();
        mock.queue_completion(Completion::with_tool_calls(
            "",
            vec![
                echo_call("a", "first", 50),
                echo_call("b", "second", 1),
                echo_call("c", "third", 20),
            ],
        ));
        mock.queue_completion(Completion::text("done"));

        let tool = SlowEcho::default();
        let agent = agent(&mock, tool.clone())
            .parallel_tool_calls(false)
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        let outcome = agent.run_detailed("q", CancellationToken::new()).await.unwrap();

        // One after another: the delays add up
        assert!(started.elapsed() >= Duration::from_millis(71));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);

        let results: Vec<_> = outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id.as_deref(), m.content.as_str()))
            .collect();
        assert_eq!(
            results,
            vec![(Some("a"), "first"), (Some("b"), "second"), (Some("c"), "third")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_tool_batch() {
        let mock = MockProvider::new();
        mock.queue_completion(Completion::with_tool_calls(
            "",
            vec![echo_call("a", "slow", 60_000), echo_call("b", "fast", 0)],
        ));
        mock.queue_completion(Completion::text("never"));

        let tool = SlowEcho::default();
        let agent = agent(&mock, tool.clone()).build().unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = agent.run_with_cancel("q", cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.remaining(), 1);
        assert!(tool.calls.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_mid_tool_call_stream() {
        let mock = MockProvider::new();
        mock.queue(MockResponse::StreamThenStall(vec![
            StreamDelta::ToolCallStart { id: "a".into(), name: "echo".into() },
            StreamDelta::ToolCallArguments { id: "a".into(), fragment: r#"{"text":"#.into() },
        ]));
        mock.queue_completion(Completion::text("never"));

        let tool = SlowEcho::default();
        let agent = agent(&mock, tool.clone())
            .stream(true)
            .round_timeout(Some(Duration::from_secs(2)))
            .build()
            .unwrap();

        let err = agent.ask("q").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(2)));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(AgentBuilder::new().build(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_zero_rounds() {
        let result = AgentBuilder::new()
            .provider(Arc::new(MockProvider::new()))
            .max_rounds(Some(0))
            .build();
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
