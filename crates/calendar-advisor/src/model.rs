//! Calendar Domain Models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, Result};

/// Canonical, case-insensitive form of a user name
pub fn normalize_user(user: &str) -> String {
    user.trim().to_lowercase()
}

/// A busy interval in a user's calendar.
///
/// `start < end` always holds; deserialization enforces it too. The JSON
/// form uses `User`/`Start`/`End` keys with RFC 3339 timestamps.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MeetingRecord", into = "MeetingRecord")]
pub struct Meeting {
    user: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Meeting {
    pub fn new(user: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let user = user.into();
        if start >= end {
            return Err(CalendarError::InvalidMeeting(format!(
                "{user}: start {start} is not before end {end}"
            )));
        }
        Ok(Self { user, start, end })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the meeting in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Whether the meeting starts on `date` (calendar day only)
    pub fn starts_on(&self, date: NaiveDate) -> bool {
        self.start.date_naive() == date
    }

    /// Whether the meeting belongs to `user`, ignoring case
    pub fn belongs_to(&self, user: &str) -> bool {
        normalize_user(&self.user) == normalize_user(user)
    }
}

/// Wire form of a [`Meeting`]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MeetingRecord {
    user: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<MeetingRecord> for Meeting {
    type Error = CalendarError;

    fn try_from(record: MeetingRecord) -> Result<Self> {
        Self::new(record.user, record.start, record.end)
    }
}

impl From<Meeting> for MeetingRecord {
    fn from(meeting: Meeting) -> Self {
        Self {
            user: meeting.user,
            start: meeting.start,
            end: meeting.end,
        }
    }
}

/// A lookup of one user's meetings on one calendar day
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarQuery {
    user: String,
    date: NaiveDate,
}

impl CalendarQuery {
    pub fn new(user: &str, date: NaiveDate) -> Self {
        Self {
            user: normalize_user(user),
            date,
        }
    }

    /// Normalized user name
    pub fn user(&self) -> &str {
        &self.user
    }

    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn matches(&self, meeting: &Meeting) -> bool {
        meeting.belongs_to(&self.user) && meeting.starts_on(self.date)
    }
}
