//! Service Kit - Agent Tools
//!
//! Domain-specific tools that implement `agent_core::Tool` for the
//! scheduling assistant.

mod meetings;

pub use meetings::{MEETINGS_TOOL, MeetingsArgs, MeetingsTool};
