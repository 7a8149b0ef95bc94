//! Meetings Tool
//!
//! Looks up a user's busy time for one day.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use agent_core::{
    AgentError, ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolSchema,
};

use crate::calendar::CalendarProvider;
use crate::model::normalize_user;

pub const MEETINGS_TOOL: &str = "meetings";

/// Typed arguments of the `meetings` tool
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MeetingsArgs {
    #[serde(alias = "User")]
    pub user: String,
    #[serde(alias = "Date")]
    pub date: String,
}

impl MeetingsArgs {
    /// Normalized user and parsed `YYYY-MM-DD` date
    pub fn resolve(&self) -> CoreResult<(String, NaiveDate)> {
        let user = normalize_user(&self.user);
        if user.is_empty() {
            return Err(AgentError::invalid_arguments(MEETINGS_TOOL, "user must not be empty"));
        }

        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|e| {
            AgentError::invalid_arguments(
                MEETINGS_TOOL,
                format!("date {:?} is not YYYY-MM-DD: {e}", self.date),
            )
        })?;

        Ok((user, date))
    }
}

/// Tool for looking up meetings (busy time)
pub struct MeetingsTool {
    calendar: Arc<dyn CalendarProvider>,
}

impl MeetingsTool {
    pub fn new(calendar: Arc<dyn CalendarProvider>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for MeetingsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: MEETINGS_TOOL.into(),
            description: "Get the meetings (busy time) of a user for a given date. Returns a list of meetings.".into(),
            parameters: vec![
                ParameterSchema::required_string("user", "User name"),
                ParameterSchema::required_string("date", "date in YYYY-MM-DD format"),
            ],
        }
    }

    /// Checked through the typed arguments so key aliases are honoured
    fn validate(&self, call: &ToolCall) -> CoreResult<()> {
        call.decode::<MeetingsArgs>().map(drop)
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<String> {
        let args: MeetingsArgs = call.decode()?;
        let (user, date) = args.resolve()?;

        let meetings = self.calendar.query(&user, date).await?;
        tracing::debug!(
            calendar = self.calendar.name(),
            %user,
            %date,
            found = meetings.len(),
            "Meetings lookup"
        );

        Ok(serde_json::to_string(&meetings)?)
    }
}
