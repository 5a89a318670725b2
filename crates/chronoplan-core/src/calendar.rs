//! Working-time calendars and working-day arithmetic.
//!
//! A calendar maps dates to working / non-working days through a weekly
//! pattern plus an ordered list of exceptions. Exceptions are scanned in
//! insertion order and the first interval containing the date decides,
//! overriding the weekly pattern.
//!
//! All scheduling arithmetic in the solver goes through this module:
//! stepping by working days, counting working days over an inclusive span,
//! and converting between a start date and a finish date given a duration.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Activity, CalendarId, CalendarMap};

/// Working time definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    /// Unique identifier
    pub id: CalendarId,
    /// Human-readable name
    pub name: String,
    /// Working days of the week (0 = Sunday .. 6 = Saturday)
    pub working_days: Vec<u8>,
    /// Nominal working hours per day
    pub hours_per_day: f64,
    /// Daily working windows (minutes from midnight)
    pub working_hours: Vec<TimeRange>,
    /// Date-range overrides, earlier-inserted wins
    pub exceptions: Vec<CalendarException>,
    /// Marks the project default calendar
    pub is_default: bool,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            id: "standard".into(),
            name: "Standard".into(),
            working_days: vec![1, 2, 3, 4, 5], // Mon-Fri
            hours_per_day: 8.0,
            working_hours: vec![
                TimeRange { start: 8 * 60, end: 12 * 60 },
                TimeRange { start: 13 * 60, end: 17 * 60 },
            ],
            exceptions: Vec::new(),
            is_default: true,
        }
    }
}

impl Calendar {
    /// Create a Mon-Fri calendar with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_default: false,
            ..Self::default()
        }
    }

    /// Set the name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the working days of the week (0 = Sunday)
    pub fn working_days(mut self, days: Vec<u8>) -> Self {
        self.working_days = days;
        self
    }

    /// Add an exception range
    pub fn exception(mut self, exception: CalendarException) -> Self {
        self.exceptions.push(exception);
        self
    }

    /// Total hours covered by the daily working windows
    pub fn window_hours(&self) -> f64 {
        self.working_hours.iter().map(|r| r.duration_hours()).sum()
    }

    /// Whether the calendar has any working time at all.
    /// A calendar without any is degenerate: arithmetic treats every day as
    /// working so that stepping always terminates.
    pub fn has_working_time(&self) -> bool {
        !self.working_days.is_empty() || self.exceptions.iter().any(|e| e.working)
    }

    /// Decide whether a date is a working day.
    /// Exceptions are scanned in insertion order; the first interval
    /// containing the date wins. Otherwise the weekly pattern applies.
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        for exception in &self.exceptions {
            if exception.contains(date) {
                return exception.working;
            }
        }
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self.working_days.contains(&weekday)
    }

    /// Step `offset` working days from `date` (negative steps backwards).
    /// A zero offset returns the date unchanged, working or not.
    pub fn add_working_days(&self, date: NaiveDate, offset: i64) -> NaiveDate {
        if offset == 0 {
            return date;
        }
        let every_day = !self.has_working_time();
        let forward = offset > 0;
        let mut remaining = offset.abs();
        let mut current = date;
        while remaining > 0 {
            current = if forward {
                current.succ_opt().unwrap_or(current)
            } else {
                current.pred_opt().unwrap_or(current)
            };
            if every_day || self.is_working_day(current) {
                remaining -= 1;
            }
        }
        current
    }

    /// Count working days in the inclusive interval `[start, end]`.
    /// Returns 0 when `end < start`.
    pub fn working_days_between(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        if end < start {
            return 0;
        }
        let every_day = !self.has_working_time();
        let mut current = start;
        let mut count = 0;
        while current <= end {
            if every_day || self.is_working_day(current) {
                count += 1;
            }
            current = match current.succ_opt() {
                Some(d) => d,
                None => break,
            };
        }
        count
    }

    /// Signed number of working-day steps from `from` to `to`.
    /// Zero when the dates are equal, negative when `to` precedes `from`.
    /// This is the slack measure: how many working days a date may slip.
    pub fn working_day_offset(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        match to.cmp(&from) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => {
                self.working_days_between(from.succ_opt().unwrap_or(from), to)
            }
            std::cmp::Ordering::Less => {
                -self.working_days_between(to.succ_opt().unwrap_or(to), from)
            }
        }
    }

    /// Inclusive finish date of a task starting at `start` with the given
    /// duration in working days. Zero-duration tasks finish where they start.
    pub fn end_from_start(&self, start: NaiveDate, duration: i64) -> NaiveDate {
        if duration <= 0 {
            return start;
        }
        self.add_working_days(start, duration - 1)
    }

    /// Start date of a task finishing at `end` with the given duration.
    pub fn start_from_end(&self, end: NaiveDate, duration: i64) -> NaiveDate {
        if duration <= 0 {
            return end;
        }
        self.add_working_days(end, -(duration - 1))
    }

    /// The date itself when working, otherwise the next working day
    pub fn next_working_day(&self, date: NaiveDate) -> NaiveDate {
        if !self.has_working_time() || self.is_working_day(date) {
            return date;
        }
        self.add_working_days(date, 1)
    }
}

/// Time range within a day (minutes from midnight)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    pub fn duration_hours(&self) -> f64 {
        f64::from(self.end - self.start) / 60.0
    }
}

/// Named date-range override of the weekly pattern
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarException {
    /// Display name ("Christmas break", "Crunch weekend")
    pub name: String,
    /// First day of the range (inclusive)
    pub start: NaiveDate,
    /// Last day of the range (inclusive)
    pub end: NaiveDate,
    /// Whether days in the range count as working
    pub working: bool,
}

impl CalendarException {
    /// Create an exception covering `[start, end]`
    pub fn new(
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        working: bool,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            working,
        }
    }

    /// Whether the date falls inside the range
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Resolve the calendar an activity schedules under: its own when set and
/// known, otherwise the project default, otherwise the first calendar.
pub fn calendar_for<'a>(
    activity: &Activity,
    calendars: &'a CalendarMap,
    default_calendar: &CalendarId,
) -> Option<&'a Calendar> {
    activity
        .calendar
        .as_ref()
        .and_then(|id| calendars.get(id))
        .or_else(|| calendars.get(default_calendar))
        .or_else(|| calendars.values().next())
}

// ============================================================================
// Tests
// ============================================================================
