//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` for any server speaking the Chat
//! Completions API with native tool calling: OpenAI itself, Ollama's `/v1`
//! endpoint, llama.cpp server, vLLM.

mod stream;
mod types;

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, ModelInfo,
        ProviderInfo, TokenUsage,
    },
    tool::{ToolCall, ToolDescriptor},
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use types::{
    ChatRequest, ChatResponse, ModelList, ResponseToolCall, ResponseUsage, StreamOptions,
    WireFunctionCall, WireFunctionDef, WireMessage, WireTool, WireToolCall,
};

/// OpenAI-compatible provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API base URL, including the version segment
    pub base_url: String,

    /// Bearer token; local servers usually need none
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let timeout_secs = std::env::var("AGENT_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(120);

        Self {
            base_url,
            api_key,
            timeout_secs,
        }
    }

    /// Config for a local Ollama server
    pub fn ollama() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            ..Default::default()
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// OpenAI-compatible LLM provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env())
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// List the models the server offers
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let request = self.authorize(self.client.get(self.config.endpoint("models")));
        let response = send(request).await?;
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("bad model list: {e}")))?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                owned_by: m.owned_by,
            })
            .collect())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Convert agent messages to wire format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };

                let tool_calls = (!m.tool_calls.is_empty()).then(|| {
                    m.tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            kind: "function",
                            function: WireFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect()
                });

                // Assistant turns that only call tools carry no content
                let content = if m.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(m.content.clone())
                };

                WireMessage {
                    role,
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.clone(),
                    name: if m.role == Role::Tool { m.name.clone() } else { None },
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDescriptor]) -> Vec<WireTool<'_>> {
        tools
            .iter()
            .map(|t| WireTool {
                kind: &t.kind,
                function: WireFunctionDef {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect()
    }

    fn build_request<'a>(
        messages: &[Message],
        tools: &'a [ToolDescriptor],
        opts: &'a GenerationOptions,
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &opts.model,
            messages: Self::convert_messages(messages),
            tools: Self::convert_tools(tools),
            temperature: opts.temperature,
            top_p: opts.top_p,
            top_k: opts.top_k,
            max_tokens: opts.max_tokens,
            stop: &opts.stop_sequences,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// Convert a wire response to an agent completion
    fn convert_completion(response: ChatResponse, model: &str) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("response has no choices".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(convert_tool_call)
            .collect::<Result<Vec<_>>>()?;

        let finish_reason = choice
            .finish_reason
            .as_deref()
            .and_then(convert_finish_reason);

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model: response.model.unwrap_or_else(|| model.to_string()),
            usage: response.usage.map(convert_usage),
            finish_reason,
        })
    }
}

fn convert_tool_call(call: ResponseToolCall) -> Result<ToolCall> {
    let id = call
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(generate_call_id);
    let name = call.function.name;

    match call.function.arguments {
        Value::String(raw) => ToolCall::from_raw_arguments(id, name, &raw),
        Value::Null => ToolCall::from_raw_arguments(id, name, ""),
        arguments @ Value::Object(_) => Ok(ToolCall::new(id, name, arguments)),
        other => Err(AgentError::invalid_arguments(
            name,
            format!("arguments must be a JSON object, got {other}"),
        )),
    }
}

pub(crate) fn convert_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolUse),
        "content_filter" => Some(FinishReason::ContentFilter),
        other => {
            tracing::debug!(reason = other, "Unrecognized finish reason");
            None
        }
    }
}

pub(crate) fn convert_usage(usage: ResponseUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage
            .total_tokens
            .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
    }
}

pub(crate) fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Send a request, mapping transport failures and error statuses
async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(transport_error)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn transport_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() || e.is_connect() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> AgentError {
    let detail = format!("{status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
        s if s.is_server_error() => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();

        Ok(ProviderInfo {
            name: "OpenAI-compatible".into(),
            models,
            supports_streaming: true,
            supports_tools: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(base_url = %self.config.base_url, "Provider health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = Self::build_request(messages, tools, options, false);
        let request = self
            .authorize(self.client.post(self.config.endpoint("chat/completions")))
            .json(&body);

        let response: ChatResponse = send(request)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("bad completion body: {e}")))?;

        Self::convert_completion(response, &options.model)
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let body = Self::build_request(messages, tools, options, true);
        let request = self
            .authorize(self.client.post(self.config.endpoint("chat/completions")))
            .json(&body);

        let response = send(request).await?;
        Ok(stream::decode_body(response.bytes_stream()))
    }
}
