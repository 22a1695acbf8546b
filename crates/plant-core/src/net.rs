//! Signed aggregation of per-meter daily usage into a site total.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::balance::round2;
use crate::calendar::format_date;
use crate::counter::DailyUsage;
use crate::number;

/// Contribution of a meter to the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterWeight {
    Include,
    /// A sub-meter already counted by an included meter.
    Subtract,
}

impl MeterWeight {
    pub const fn sign(self) -> f64 {
        match self {
            Self::Include => 1.0,
            Self::Subtract => -1.0,
        }
    }
}

/// How a weighted meter without data on a date affects that date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingMeterPolicy {
    /// Missing meters contribute zero; the date is kept if any meter has data.
    #[default]
    Zero,
    /// The date is dropped unless every listed meter has data.
    SkipDate,
}

/// Which meters take part in a total, and with what sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterWeights {
    weights: BTreeMap<String, MeterWeight>,
    /// Weight for meters not listed in `weights`.
    unlisted: Option<MeterWeight>,
}

impl MeterWeights {
    /// Only the listed meters count; all others are ignored.
    pub const fn explicit(weights: BTreeMap<String, MeterWeight>) -> Self {
        Self {
            weights,
            unlisted: None,
        }
    }

    /// Every meter is included with a positive sign.
    pub const fn include_all() -> Self {
        Self {
            weights: BTreeMap::new(),
            unlisted: Some(MeterWeight::Include),
        }
    }

    pub fn weight(&self, meter: &str) -> Option<MeterWeight> {
        self.weights.get(meter).copied().or(self.unlisted)
    }

    /// Names of the explicitly listed meters.
    pub fn listed(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }
}

/// Net usage for one date, with the per-meter usages that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetUsagePoint {
    pub date: String,
    #[serde(serialize_with = "number::serialize")]
    pub value: f64,
    #[serde(serialize_with = "number::serialize_map")]
    pub meters: BTreeMap<String, f64>,
}

/// Combines per-meter usage series into a signed daily total.
#[derive(Debug, Clone, Copy)]
pub struct NetUsageAggregator<'a> {
    weights: &'a MeterWeights,
    policy: MissingMeterPolicy,
}

impl<'a> NetUsageAggregator<'a> {
    pub const fn new(weights: &'a MeterWeights, policy: MissingMeterPolicy) -> Self {
        Self { weights, policy }
    }

    /// One point per date on which at least one weighted meter has usage,
    /// ascending by date. Usages of unweighted meters are ignored.
    pub fn aggregate(&self, usages: impl IntoIterator<Item = DailyUsage>) -> Vec<NetUsagePoint> {
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
        for usage in usages {
            if self.weights.weight(&usage.meter).is_none() {
                continue;
            }
            *by_date
                .entry(usage.date)
                .or_default()
                .entry(usage.meter)
                .or_insert(0.0) += usage.usage;
        }

        by_date
            .into_iter()
            .filter(|(date, meters)| {
                let complete = self.policy == MissingMeterPolicy::Zero
                    || self.weights.listed().all(|name| meters.contains_key(name));
                if !complete {
                    tracing::debug!(%date, "skipping date with missing meters");
                }
                complete
            })
            .map(|(date, meters)| {
                let total: f64 = meters
                    .iter()
                    .filter_map(|(name, usage)| self.weights.weight(name).map(|w| w.sign() * usage))
                    .sum();
                NetUsagePoint {
                    date: format_date(date),
                    value: round2(total),
                    meters,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn usage(d: u32, meter: &str, value: f64) -> DailyUsage {
        DailyUsage {
            date: date(d),
            meter: meter.to_string(),
            usage: value,
        }
    }

    fn site_weights() -> MeterWeights {
        MeterWeights::explicit(BTreeMap::from([
            ("main-a".to_string(), MeterWeight::Include),
            ("main-b".to_string(), MeterWeight::Include),
            ("office".to_string(), MeterWeight::Subtract),
        ]))
    }

    #[test]
    fn subtracts_excluded_meters() {
        let weights = site_weights();
        let points = NetUsageAggregator::new(&weights, MissingMeterPolicy::Zero).aggregate([
            usage(1, "main-a", 100.0),
            usage(1, "main-b", 50.0),
            usage(1, "office", 30.0),
        ]);
        assert_eq!(points.len(), 1);
        assert!((points[0].value - 120.0).abs() < 1e-9);
        assert_eq!(points[0].meters.len(), 3);
    }

    #[test]
    fn missing_meter_counts_as_zero_by_default() {
        let weights = site_weights();
        let points = NetUsageAggregator::new(&weights, MissingMeterPolicy::Zero)
            .aggregate([usage(1, "main-a", 100.0), usage(2, "office", 5.0)]);
        let dates: Vec<&str> = points.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-02"]);
        assert!((points[0].value - 100.0).abs() < 1e-9);
        assert!((points[1].value - -5.0).abs() < 1e-9);
    }

    #[test]
    fn skip_date_policy_requires_every_listed_meter() {
        let weights = site_weights();
        let points = NetUsageAggregator::new(&weights, MissingMeterPolicy::SkipDate).aggregate([
            usage(1, "main-a", 100.0),
            usage(2, "main-a", 10.0),
            usage(2, "main-b", 10.0),
            usage(2, "office", 1.0),
        ]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, "2024-03-02");
        assert!((points[0].value - 19.0).abs() < 1e-9);
    }

    #[test]
    fn dates_without_data_are_omitted_and_unlisted_meters_ignored() {
        let weights = site_weights();
        let points = NetUsageAggregator::new(&weights, MissingMeterPolicy::Zero)
            .aggregate([usage(3, "boiler", 40.0)]);
        assert!(points.is_empty());
    }

    #[test]
    fn include_all_sums_every_meter() {
        let weights = MeterWeights::include_all();
        let points = NetUsageAggregator::new(&weights, MissingMeterPolicy::SkipDate)
            .aggregate([usage(1, "well", 12.5), usage(1, "city", 7.5)]);
        assert_eq!(points.len(), 1);
        assert!((points[0].value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn point_serializes_to_contract_shape() {
        let weights = site_weights();
        let points = NetUsageAggregator::new(&weights, MissingMeterPolicy::Zero)
            .aggregate([usage(1, "main-a", 100.0), usage(1, "office", 0.255)]);
        assert_snapshot!(
            serde_json::to_string(&points[0]).unwrap(),
            @r#"{"date":"2024-03-01","value":99.75,"meters":{"main-a":100,"office":0.255}}"#
        );
    }
}
