//! Calendar dates and operational-day windows.
//!
//! Plant figures are reported per operational day: from the configured start
//! hour (08:00 by default) on a calendar date to 24 hours later. Local times
//! are resolved in the plant's zone using the offset in effect on that date.

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::types::CoreError;

/// Parses a strict `YYYY-MM-DD` date. Anything else yields `None`.
pub fn parse_date_only(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(idx, byte)| match idx {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !well_formed {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Every date in `[start, end]`, ascending. Empty when `start > end`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Formats an instant as ISO-8601 UTC with millisecond precision.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One operational day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationalWindow {
    /// The calendar date the window starts on.
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    /// Exclusive end, exactly 24 hours after `start`.
    pub end: DateTime<Utc>,
}

/// Where plant-local wall-clock times are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantZone {
    /// A constant offset with no daylight saving.
    Fixed(FixedOffset),
    /// An IANA time zone such as `Asia/Shanghai`.
    Named(Tz),
    /// The host's local time zone.
    HostLocal,
}

impl From<FixedOffset> for PlantZone {
    fn from(offset: FixedOffset) -> Self {
        Self::Fixed(offset)
    }
}

impl From<Tz> for PlantZone {
    fn from(zone: Tz) -> Self {
        Self::Named(zone)
    }
}

impl PlantZone {
    fn to_utc(self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::Fixed(offset) => resolve_local(&offset, local),
            Self::Named(zone) => resolve_local(&zone, local),
            Self::HostLocal => resolve_local(&Local, local),
        }
    }

    fn date_of(self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Fixed(offset) => instant.with_timezone(&offset).date_naive(),
            Self::Named(zone) => instant.with_timezone(&zone).date_naive(),
            Self::HostLocal => instant.with_timezone(&Local).date_naive(),
        }
    }
}

/// Resolves a wall-clock time in `zone`. Ambiguous times take the earlier
/// instant; times skipped by a forward transition move past the gap.
fn resolve_local<Z: TimeZone>(zone: &Z, local: NaiveDateTime) -> DateTime<Utc> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => instant.with_timezone(&Utc),
        LocalResult::None => {
            let before = zone.offset_from_utc_datetime(&local).fix();
            (local - Duration::seconds(i64::from(before.local_minus_utc()))).and_utc()
        }
    }
}

/// Maps calendar dates to operational windows and instants to local dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationalCalendar {
    zone: PlantZone,
    day_start: NaiveTime,
}

impl OperationalCalendar {
    /// Creates a calendar whose days start at `start_hour` local time.
    pub fn new(zone: impl Into<PlantZone>, start_hour: u32) -> Result<Self, CoreError> {
        let day_start =
            NaiveTime::from_hms_opt(start_hour, 0, 0).ok_or_else(|| CoreError::InvalidConfig {
                field: "operational_day_start_hour",
                message: format!("must be within 0..=23, got {start_hour}"),
            })?;
        Ok(Self {
            zone: zone.into(),
            day_start,
        })
    }

    pub const fn zone(&self) -> PlantZone {
        self.zone
    }

    /// The operational window starting on `date`.
    pub fn window(&self, date: NaiveDate) -> OperationalWindow {
        let start = self.zone.to_utc(date.and_time(self.day_start));
        OperationalWindow {
            date,
            start,
            end: start + Duration::hours(24),
        }
    }

    /// The local calendar date of `instant`.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.zone.date_of(instant)
    }

    /// Local midnight of `date`, as a UTC instant.
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.zone.to_utc(date.and_time(NaiveTime::MIN))
    }
}
