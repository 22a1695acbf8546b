//! Daily usage from cumulative, reset-prone utility counters.
//!
//! The last reading of each local calendar day is paired with the last reading
//! of the next day that has readings:
//!
//! - next reading flagged as a reset, or smaller than the current one: the
//!   counter restarted from zero, so usage is the next raw value
//! - otherwise: usage is the difference
//!
//! The final day with readings has no successor and produces no usage.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::calendar::OperationalCalendar;
use crate::records::{CounterReading, MeterSeries};

/// Usage of one meter on one date, already scaled by the meter multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub meter: String,
    pub usage: f64,
}

/// Raw (unscaled) usage between two consecutive day-end readings.
pub fn usage_between(current: &CounterReading, next: &CounterReading) -> f64 {
    if next.is_reset || next.value < current.value {
        next.value
    } else {
        next.value - current.value
    }
}

/// Strictly positive daily usages of `series` for dates in `[start, end]`.
///
/// Readings dated up to `end + 1` are used so `end` itself can have a
/// successor. Readings outside that span are ignored.
pub fn daily_usage(
    series: &MeterSeries,
    calendar: &OperationalCalendar,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyUsage> {
    if start > end {
        return Vec::new();
    }
    let last_day = end.succ_opt().unwrap_or(end);

    let mut day_end: BTreeMap<NaiveDate, &CounterReading> = BTreeMap::new();
    for reading in &series.readings {
        let date = calendar.local_date(reading.recorded_at);
        if date < start || date > last_day {
            continue;
        }
        day_end
            .entry(date)
            .and_modify(|latest| {
                if reading.recorded_at >= latest.recorded_at {
                    *latest = reading;
                }
            })
            .or_insert(reading);
    }

    let multiplier = series.multiplier.unwrap_or(1.0);
    let days: Vec<_> = day_end.into_iter().collect();
    days.windows(2)
        .filter_map(|pair| {
            let [(date, current), (_, next)] = pair else {
                return None;
            };
            if *date > end {
                return None;
            }
            let usage = usage_between(current, next) * multiplier;
            (usage > 0.0).then(|| DailyUsage {
                date: *date,
                meter: series.name.clone(),
                usage,
            })
        })
        .collect()
}
