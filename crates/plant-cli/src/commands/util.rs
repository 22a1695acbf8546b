//! Shared utilities for CLI commands.

use std::io::Write;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use plant_core::calendar::parse_date_only;
use plant_core::{OperationalCalendar, PlantConfig};

use crate::DateRangeArgs;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string as either RFC 3339 or relative time.
///
/// Supports:
/// - RFC 3339: "2024-02-10T08:00:00+08:00"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    parse_datetime_at(s, Utc::now())
}

fn parse_datetime_at(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use RFC 3339 (e.g., 2024-02-10T08:00:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// A validated inclusive range of calendar dates.
///
/// `start > end` is allowed and describes an empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Validates `--start` and `--end`, both strict `YYYY-MM-DD`.
    pub fn parse(args: &DateRangeArgs) -> Result<Self> {
        Ok(Self {
            start: parse_date_arg("start", &args.start)?,
            end: parse_date_arg("end", &args.end)?,
        })
    }

    /// Instants spanned by the operational windows of the range.
    pub fn window_bounds(&self, calendar: &OperationalCalendar) -> (DateTime<Utc>, DateTime<Utc>) {
        (calendar.window(self.start).start, calendar.window(self.end).end)
    }

    /// Instants covering every local date from `start` to `end + 1`, so the
    /// last day's counter readings have a successor.
    pub fn reading_bounds(&self, calendar: &OperationalCalendar) -> (DateTime<Utc>, DateTime<Utc>) {
        let after = self
            .end
            .checked_add_days(chrono::Days::new(2))
            .unwrap_or(self.end);
        (calendar.local_midnight(self.start), calendar.local_midnight(after))
    }
}

fn parse_date_arg(name: &str, value: &str) -> Result<NaiveDate> {
    parse_date_only(value)
        .with_context(|| format!("invalid --{name} {value:?}: expected a date as YYYY-MM-DD"))
}

/// Builds the plant calendar, defaulting to the host's time zone.
pub fn plant_calendar(plant: &PlantConfig) -> Result<OperationalCalendar> {
    plant
        .calendar()
        .context("invalid operational calendar configuration")
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    data: &'a T,
}

/// Writes `{"data": ...}` followed by a newline.
pub fn write_data<W: Write, T: Serialize>(writer: &mut W, data: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, &Envelope { data }).context("failed to encode output")?;
    writeln!(writer)?;
    Ok(())
}
