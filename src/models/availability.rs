use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

use super::Booking;

const SECONDS_PER_DAY: i64 = 86_400;

/// A half-open rental window `[start, end)`, truncated to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RentalPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, EngineError> {
        let start = start.trunc_subsecs(0);
        let end = end.trunc_subsecs(0);
        if end <= start {
            return Err(EngineError::InvalidInterval {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parses RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
    pub fn parse(start: &str, end: &str) -> Result<Self, EngineError> {
        Self::new(parse_instant(start)?, parse_instant(end)?)
    }

    pub fn overlaps(&self, other: &RentalPeriod) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Billable days: partial days round up, never fewer than one.
    pub fn total_days(&self) -> i64 {
        let secs = (self.end - self.start).num_seconds();
        ((secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY).max(1)
    }
}

/// An occupied window on a vehicle. The booking code is only filled in for staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusyWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_code: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl BusyWindow {
    pub fn of(booking: &Booking, with_code: bool) -> Self {
        Self {
            booking_code: with_code.then(|| booking.booking_code.clone()),
            start_date: booking.start_date,
            end_date: booking.end_date,
        }
    }
}

pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, EngineError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| EngineError::Validation(format!("invalid date: {s}")))
}
