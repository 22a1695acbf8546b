//! Fixed-width resampling of tank level readings.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::calendar::format_instant;
use crate::config::LevelHistoryDefaults;
use crate::number;
use crate::records::StockSnapshot;
use crate::types::{CoreError, VesselId};

/// Average level of each vessel that reported within one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledBucket {
    pub bucket_start: DateTime<Utc>,
    /// Sparse: vessels without readings in the bucket are absent.
    pub levels: BTreeMap<VesselId, f64>,
}

/// Averages `readings` within `[start, end]` into buckets aligned to
/// multiples of `bucket_seconds` since the Unix epoch.
///
/// At most `limit` buckets are returned, earliest first.
pub fn resample(
    readings: &[StockSnapshot],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    bucket_seconds: i64,
    limit: usize,
) -> Result<Vec<ResampledBucket>, CoreError> {
    if bucket_seconds <= 0 {
        return Err(CoreError::InvalidBucketWidth {
            seconds: bucket_seconds,
        });
    }

    let mut sums: BTreeMap<i64, BTreeMap<VesselId, (f64, u32)>> = BTreeMap::new();
    for reading in readings {
        if reading.recorded_at < start || reading.recorded_at > end {
            continue;
        }
        let seconds = reading.recorded_at.timestamp();
        let Some(bucket) = seconds.checked_sub(seconds.rem_euclid(bucket_seconds)) else {
            continue;
        };
        let (sum, count) = sums
            .entry(bucket)
            .or_default()
            .entry(reading.vessel_id)
            .or_insert((0.0, 0));
        *sum += reading.level_percent;
        *count += 1;
    }

    Ok(sums
        .into_iter()
        .filter_map(|(bucket, vessels)| {
            let bucket_start = DateTime::from_timestamp(bucket, 0)?;
            let levels = vessels
                .into_iter()
                .map(|(vessel, (sum, count))| (vessel, sum / f64::from(count)))
                .collect();
            Some(ResampledBucket { bucket_start, levels })
        })
        .take(limit)
        .collect())
}

/// Optional parameters of a level history query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelHistoryRequest {
    pub hours: Option<i64>,
    pub bucket_minutes: Option<i64>,
    pub limit: Option<usize>,
    pub end: Option<DateTime<Utc>>,
    /// Start at the earliest reading instead of `end - hours`.
    pub all: bool,
}

/// A level history query with every parameter decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelHistoryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bucket_minutes: i64,
    /// `bucket_minutes` in seconds, checked against overflow.
    pub bucket_seconds: i64,
    pub limit: usize,
}

impl LevelHistoryRequest {
    /// Fills in defaults.
    ///
    /// `earliest` is the first recorded reading, used when `all` is set; with
    /// no readings at all the range collapses to `[end, end]`. Without an
    /// explicit limit, enough buckets to cover the span plus two are allowed,
    /// capped at `defaults.max_limit`.
    pub fn resolve(
        &self,
        defaults: &LevelHistoryDefaults,
        now: DateTime<Utc>,
        earliest: Option<DateTime<Utc>>,
    ) -> Result<LevelHistoryWindow, CoreError> {
        let bucket_minutes = self.bucket_minutes.unwrap_or(defaults.bucket_minutes);
        if bucket_minutes <= 0 {
            return Err(CoreError::InvalidBucketWidth {
                seconds: bucket_minutes.saturating_mul(60),
            });
        }
        let bucket_seconds = bucket_minutes
            .checked_mul(60)
            .ok_or_else(|| CoreError::InvalidParameter {
                name: "bucket_minutes",
                message: format!("out of range: {bucket_minutes}"),
            })?;
        let hours = self.hours.unwrap_or(defaults.hours);
        if hours < 0 {
            return Err(CoreError::InvalidParameter {
                name: "hours",
                message: format!("must not be negative, got {hours}"),
            });
        }

        let end = self.end.unwrap_or(now);
        let start = if self.all {
            earliest.unwrap_or(end)
        } else {
            Duration::try_hours(hours)
                .and_then(|span| end.checked_sub_signed(span))
                .ok_or_else(|| CoreError::InvalidParameter {
                    name: "hours",
                    message: format!("out of range: {hours}"),
                })?
        };

        let limit = self.limit.unwrap_or_else(|| {
            let bucket_ms = bucket_seconds.saturating_mul(1000);
            let span_ms = (end - start).num_milliseconds();
            let expected = ceil_div(span_ms, bucket_ms).saturating_add(2).max(1);
            usize::try_from(expected).map_or(defaults.max_limit, |n| n.min(defaults.max_limit))
        });

        Ok(LevelHistoryWindow {
            start,
            end,
            bucket_minutes,
            bucket_seconds,
            limit,
        })
    }
}

/// `ceil(a / b)` for positive `b`.
const fn ceil_div(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}

/// Identity of a tank in history output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TankBasic {
    pub id: VesselId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelHistoryRow {
    pub timestamp: String,
    #[serde(serialize_with = "number::serialize_map")]
    pub levels: BTreeMap<VesselId, f64>,
}

/// Level history response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelHistory {
    pub start: String,
    pub end: String,
    pub bucket_minutes: i64,
    pub tanks: Vec<TankBasic>,
    pub rows: Vec<LevelHistoryRow>,
}

impl LevelHistory {
    pub fn new(window: &LevelHistoryWindow, tanks: Vec<TankBasic>, buckets: Vec<ResampledBucket>) -> Self {
        Self {
            start: format_instant(window.start),
            end: format_instant(window.end),
            bucket_minutes: window.bucket_minutes,
            tanks,
            rows: buckets
                .into_iter()
                .map(|bucket| LevelHistoryRow {
                    timestamp: format_instant(bucket.bucket_start),
                    levels: bucket.levels,
                })
                .collect(),
        }
    }
}
