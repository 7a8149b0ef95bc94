//! # agent-core
//!
//! Provider-agnostic tool-calling conversation loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Agent                              │
//! │  ┌──────────────┐  ┌─────────────┐  ┌────────────────────┐  │
//! │  │ Conversation │  │    Tools    │  │    LlmProvider     │  │
//! │  │     Loop     │──│  Registry   │──│    (Strategy)      │  │
//! │  └──────────────┘  └─────────────┘  └────────────────────┘  │
//! │          │                                   │              │
//! │          └────────── StreamAccumulator ◄─────┘              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the loop independent of the backend; the
//! stream accumulator reduces streamed and whole responses to one shape.

pub mod error;
pub mod message;
pub mod mock;
pub mod provider;
pub mod reasoning;
pub mod stream;
pub mod tool;

pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider, StreamDelta};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, RunOutcome, RunState};
pub use stream::StreamAccumulator;
pub use tool::{ParameterSchema, Tool, ToolCall, ToolDescriptor, ToolRegistry, ToolResult, ToolSchema};
pub use tokio_util::sync::CancellationToken;
