//! Conversation Messages
//!
//! Standard message format used across the agent system, plus the
//! append-only [`Conversation`] owned by a single run.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::tool::{ToolCall, ToolResult};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (may be empty for assistant turns that only call tools)
    pub content: String,

    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// The request this tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name (for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message carrying tool call requests
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message answering `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Add a name to the message
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether this is an assistant turn with pending tool requests
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

impl From<ToolResult> for Message {
    fn from(result: ToolResult) -> Self {
        Self::tool(result.tool_call_id, result.content).with_name(result.name)
    }
}

/// Ordered, append-only message history of one run.
///
/// Always starts with exactly one system message. Tool call ids only need to
/// be unique within the assistant turn that issued them, so a tool message
/// must answer a call of the latest assistant turn, and at most once.
#[derive(Clone, Debug, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,

    /// Call ids of the latest assistant turn, in issue order
    #[serde(skip)]
    turn_calls: Vec<String>,

    #[serde(skip)]
    answered: HashSet<String>,
}

impl Conversation {
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
            turn_calls: Vec::new(),
            answered: HashSet::new(),
        }
    }

    /// Append a message, enforcing the conversation protocol.
    ///
    /// A rejected message leaves the conversation unchanged.
    pub fn push(&mut self, message: Message) -> Result<()> {
        match message.role {
            Role::System => {
                return Err(AgentError::Conversation(
                    "system message is fixed at the start of the conversation".into(),
                ));
            }
            Role::Assistant => {
                if let Some(id) = self.pending_tool_calls().first() {
                    return Err(AgentError::Conversation(format!(
                        "assistant message while tool call {id:?} is unanswered"
                    )));
                }

                let mut seen = HashSet::new();
                if let Some(call) = message.tool_calls.iter().find(|c| !seen.insert(c.id.as_str())) {
                    return Err(AgentError::Conversation(format!(
                        "duplicate tool call id {:?} in one turn",
                        call.id
                    )));
                }

                self.turn_calls = message.tool_calls.iter().map(|c| c.id.clone()).collect();
                self.answered.clear();
            }
            Role::Tool => {
                let id = message.tool_call_id.as_deref().ok_or_else(|| {
                    AgentError::Conversation("tool message without tool_call_id".into())
                })?;
                if !self.turn_calls.iter().any(|issued| issued == id) {
                    return Err(AgentError::Conversation(format!(
                        "tool result for unknown call {id:?}"
                    )));
                }
                if !self.answered.insert(id.to_string()) {
                    return Err(AgentError::Conversation(format!(
                        "tool call {id:?} already answered"
                    )));
                }
            }
            Role::User => {}
        }

        self.messages.push(message);
        Ok(())
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The fixed system prompt
    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Calls of the latest assistant turn that have no result yet
    pub fn pending_tool_calls(&self) -> Vec<&str> {
        self.turn_calls
            .iter()
            .map(String::as_str)
            .filter(|id| !self.answered.contains(*id))
            .collect()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system message is present from construction
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
