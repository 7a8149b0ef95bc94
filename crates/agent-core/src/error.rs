//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Every variant aborts the enclosing run. Nothing in the conversation loop
/// retries; `is_retryable` only tells an outer caller what is worth retrying.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error (bad response, protocol violation, ...)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The model asked for a tool that is not registered
    #[error("Unsupported tool: {0:?}")]
    UnsupportedTool(String),

    /// Tool arguments failed to parse or validate
    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Maximum provider round trips reached in the conversation loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// A provider round trip exceeded its time budget
    #[error("Provider round timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the run
    #[error("Run cancelled")]
    Cancelled,

    /// Conversation protocol violation (e.g. orphan tool result)
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Shorthand for an [`AgentError::InvalidArguments`].
    pub fn invalid_arguments(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Timeout(_) | Self::Io(_)
        )
    }

    /// Whether the error originates from the completion provider.
    pub const fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Auth(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::UnsupportedTool(name) => format!("The model asked for an unknown tool '{name}'."),
            Self::InvalidArguments { tool, message } => {
                format!("The model called '{tool}' with invalid arguments: {message}")
            }
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::MaxIterations(_) => {
                "The request took too many steps to process. Please try a simpler query.".into()
            }
            Self::Timeout(_) => "The AI service took too long to answer.".into(),
            Self::Cancelled => "The request was cancelled.".into(),
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
