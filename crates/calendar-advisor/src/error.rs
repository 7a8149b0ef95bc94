//! Error Types for Calendar Advisor

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalendarError>;

#[derive(Error, Debug)]
pub enum CalendarError {
    /// The static meeting table could not be loaded
    #[error("Calendar table line {line}: {reason}")]
    StartupData { line: usize, reason: String },

    #[error("Invalid meeting: {0}")]
    InvalidMeeting(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CalendarError> for AgentError {
    fn from(err: CalendarError) -> Self {
        Self::ToolExecution(err.to_string())
    }
}
