//! Mock provider for testing.
//!
//! [`MockProvider`] is a queue-based fake that lets tests script exactly
//! what each provider round returns, without touching the network. Every
//! call records the conversation it was given for later assertions.
//!
//! ```rust,ignore
//! let mock = MockProvider::new();
//! mock.queue_completion(Completion::with_tool_calls("", vec![call]));
//! mock.queue_completion(Completion::text("Here are three slots..."));
//!
//! let agent = AgentBuilder::new().provider(Arc::new(mock.clone())).build()?;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, ProviderInfo, StreamDelta,
};
use crate::stream::{collect, completion_to_deltas};
use crate::tool::ToolDescriptor;

/// Cloneable error subset for queuing.
///
/// [`AgentError`] is not `Clone`; this mirrors the provider variants and is
/// converted when dequeued.
#[derive(Debug, Clone)]
pub enum MockError {
    Provider(String),
    Unavailable(String),
    Auth(String),
    RateLimited(String),
}

impl From<MockError> for AgentError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::Provider(msg) => Self::Provider(msg),
            MockError::Unavailable(msg) => Self::ProviderUnavailable(msg),
            MockError::Auth(msg) => Self::Auth(msg),
            MockError::RateLimited(msg) => Self::RateLimited(msg),
        }
    }
}

/// One scripted provider round
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A whole completion (expanded to deltas when streamed)
    Complete(Completion),
    /// A raw delta sequence (reduced when not streamed)
    Stream(Vec<StreamDelta>),
    /// Fail the round
    Error(MockError),
    /// Never answer; for timeout and cancellation tests
    Stall,
    /// Stream these deltas, then hang without ending the turn
    StreamThenStall(Vec<StreamDelta>),
}

/// What a provider round was asked
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
    pub options: GenerationOptions,
    pub streamed: bool,
}

/// A queue-based mock provider. Clones share the same queue and recordings.
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, response: MockResponse) {
        lock(&self.responses).push_back(response);
    }

    pub fn queue_completion(&self, completion: Completion) {
        self.queue(MockResponse::Complete(completion));
    }

    pub fn queue_stream(&self, deltas: Vec<StreamDelta>) {
        self.queue(MockResponse::Stream(deltas));
    }

    pub fn queue_error(&self, error: MockError) {
        self.queue(MockResponse::Error(error));
    }

    /// Every round seen so far, in order
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Responses not consumed yet
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }

    fn next(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
        streamed: bool,
    ) -> Result<MockResponse> {
        lock(&self.calls).push(RecordedCall {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            options: options.clone(),
            streamed,
        });

        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| AgentError::Provider("mock response queue is empty".into()))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "Mock".into(),
            models: Vec::new(),
            supports_streaming: true,
            supports_tools: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        match self.next(messages, tools, options, false)? {
            MockResponse::Complete(completion) => Ok(completion),
            MockResponse::Stream(deltas) => {
                let stream: CompletionStream =
                    Box::pin(futures::stream::iter(deltas.into_iter().map(Ok::<_, AgentError>)));
                collect(stream, &options.model).await
            }
            MockResponse::Error(err) => Err(err.into()),
            MockResponse::Stall | MockResponse::StreamThenStall(_) => futures::future::pending().await,
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let deltas = match self.next(messages, tools, options, true)? {
            MockResponse::Complete(completion) => completion_to_deltas(&completion),
            MockResponse::Stream(deltas) => deltas,
            MockResponse::Error(err) => return Err(err.into()),
            MockResponse::Stall => return Ok(Box::pin(futures::stream::pending::<Result<StreamDelta>>())),
            MockResponse::StreamThenStall(deltas) => {
                let head = futures::stream::iter(deltas.into_iter().map(Ok::<_, AgentError>));
                return Ok(Box::pin(head.chain(futures::stream::pending())));
            }
        };
        Ok(Box::pin(futures::stream::iter(deltas.into_iter().map(Ok::<_, AgentError>))))
    }
}
