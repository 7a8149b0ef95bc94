//! Static Calendar Table
//!
//! In-memory meeting store built once at startup from a small comma
//! separated table (`user,date,start_time,end_time`). Read-only afterwards,
//! so it is shared behind an `Arc` without locking.

use std::path::Path;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::CalendarProvider;
use crate::error::{CalendarError, Result};
use crate::model::{CalendarQuery, Meeting, normalize_user};

/// The table compiled into the binary
pub const EMBEDDED_TABLE: &str = include_str!("../../data/meetings.csv");

const HEADER: [&str; 4] = ["user", "date", "start_time", "end_time"];

/// Read-only calendar backed by a static table
#[derive(Clone, Debug)]
pub struct StaticCalendar {
    meetings: Vec<Meeting>,
}

impl StaticCalendar {
    /// Load the embedded table
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_TABLE)
    }

    /// Load a table from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Build from already constructed meetings
    pub fn from_meetings(mut meetings: Vec<Meeting>) -> Self {
        meetings.sort_by_key(Meeting::start);
        Self { meetings }
    }

    /// Parse table text.
    ///
    /// Blank lines and `#` comments are skipped, a header row is optional.
    /// Any malformed row fails the whole load.
    pub fn parse(text: &str) -> Result<Self> {
        let mut meetings = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let row = raw.trim();
            if row.is_empty() || row.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = row.split(',').map(str::trim).collect();
            if fields.len() != HEADER.len() {
                return Err(CalendarError::StartupData {
                    line,
                    reason: format!("expected {} columns, found {}", HEADER.len(), fields.len()),
                });
            }
            if meetings.is_empty() && fields.iter().zip(HEADER).all(|(f, h)| f.eq_ignore_ascii_case(h)) {
                continue;
            }

            meetings.push(parse_row(line, &fields)?);
        }

        tracing::debug!(meetings = meetings.len(), "Loaded calendar table");
        Ok(Self::from_meetings(meetings))
    }

    pub fn len(&self) -> usize {
        self.meetings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty()
    }

    /// Synchronous lookup used by the provider impl
    pub fn lookup(&self, query: &CalendarQuery) -> Vec<Meeting> {
        self.meetings
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect()
    }
}

fn parse_row(line: usize, fields: &[&str]) -> Result<Meeting> {
    let startup = |reason: String| CalendarError::StartupData { line, reason };

    let user = normalize_user(fields[0]);
    if user.is_empty() {
        return Err(startup("empty user".into()));
    }

    let date = NaiveDate::parse_from_str(fields[1], "%Y-%m-%d")
        .map_err(|e| startup(format!("bad date {:?}: {e}", fields[1])))?;
    let start = parse_time(fields[2]).map_err(|e| startup(format!("bad start_time {:?}: {e}", fields[2])))?;
    let end = parse_time(fields[3]).map_err(|e| startup(format!("bad end_time {:?}: {e}", fields[3])))?;

    Meeting::new(
        user,
        NaiveDateTime::new(date, start).and_utc(),
        NaiveDateTime::new(date, end).and_utc(),
    )
    .map_err(|e| startup(e.to_string()))
}

fn parse_time(s: &str) -> std::result::Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
}

#[async_trait]
impl CalendarProvider for StaticCalendar {
    async fn query(&self, user: &str, date: NaiveDate) -> Result<Vec<Meeting>> {
        Ok(self.lookup(&CalendarQuery::new(user, date)))
    }

    fn name(&self) -> &str {
        "StaticCalendar"
    }
}
