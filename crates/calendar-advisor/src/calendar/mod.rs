//! Calendar Data Providers
//!
//! Abstractions and implementations for busy-time lookups.

mod table;

pub use table::{EMBEDDED_TABLE, StaticCalendar};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::model::Meeting;

/// Calendar data provider trait (Strategy pattern)
///
/// Implementations are read-only: a query never changes what later queries
/// return.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Meetings of `user` (case-insensitive) starting on `date`.
    ///
    /// An unknown user or an empty day yields an empty list, not an error.
    async fn query(&self, user: &str, date: NaiveDate) -> Result<Vec<Meeting>>;

    /// Provider name
    fn name(&self) -> &str;
}
