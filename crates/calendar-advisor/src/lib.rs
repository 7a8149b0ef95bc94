//! # calendar-advisor
//!
//! Meeting lookup tools that let a model suggest free time slots.
//!
//! ```text
//! ┌──────────────────┐   meetings(user, date)   ┌──────────────────┐
//! │  agent-core loop │ ───────────────────────► │   MeetingsTool   │
//! └──────────────────┘                          └────────┬─────────┘
//!                                                        │ query
//!                                               ┌────────▼─────────┐
//!                                               │ CalendarProvider │
//!                                               │ (StaticCalendar) │
//!                                               └──────────────────┘
//! ```

pub mod calendar;
pub mod error;
pub mod model;
pub mod svckit;

use std::sync::Arc;

use agent_core::ToolRegistry;

pub use calendar::{CalendarProvider, StaticCalendar};
pub use error::{CalendarError, Result};
pub use model::{CalendarQuery, Meeting};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::MeetingsTool;
}

/// Registry with every scheduling tool backed by `calendar`
pub fn scheduling_tools(calendar: Arc<dyn CalendarProvider>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(svckit::MeetingsTool::new(calendar));
    registry
}

/// System prompt for the scheduling agent
pub const SCHEDULING_PROMPT: &str = r"You are a scheduling assistant.

Use the `meetings` tool to look up the busy time of every person involved, one call per person and date, before suggesting anything.
Dates are passed as YYYY-MM-DD. Meeting times are in UTC.

Only suggest slots that do not overlap any existing meeting of any participant, and state the slots as start and end times.";

/// Question asked when none is given
pub const DEFAULT_QUERY: &str = "Suggest 3 time slots for a 45 minute meeting between Miki & Bill on June 7, 2026. \
Make sure the time slots you suggest don't overlap with existing meetings.";
