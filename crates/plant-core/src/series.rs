//! Daily consumption and production series.
//!
//! One point per calendar day in `[start, end]`, each evaluated over its
//! operational window. Days are independent and are fanned out on a bounded
//! worker pool, then sorted by date.

use rayon::prelude::*;
use serde::Serialize;

use crate::balance::{BalanceKind, round2};
use crate::calendar::{OperationalCalendar, OperationalWindow, days_inclusive, format_date, format_instant, parse_date_only};
use crate::config::ProductionMaterials;
use crate::ledger::Ledger;
use crate::number;
use crate::types::{CoreError, MaterialId};

/// Consumption of one material over one operational day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyConsumptionPoint {
    pub date: String,
    pub window_start: String,
    pub window_end: String,
    #[serde(serialize_with = "number::serialize")]
    pub value: f64,
}

/// Acid production over one operational day. All figures in tons.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyProductionPoint {
    pub date: String,
    pub window_start: String,
    pub window_end: String,
    #[serde(serialize_with = "number::serialize")]
    pub acid98: f64,
    #[serde(serialize_with = "number::serialize")]
    pub fuming_acid: f64,
    #[serde(serialize_with = "number::serialize")]
    pub reagent_acid: f64,
    #[serde(serialize_with = "number::serialize")]
    pub total_raw: f64,
    #[serde(serialize_with = "number::serialize")]
    pub total98_equivalent: f64,
}

/// Drives balance computations across a date range.
#[derive(Debug, Clone, Copy)]
pub struct DailySeriesBuilder<'a> {
    ledger: &'a Ledger,
    calendar: OperationalCalendar,
    max_parallel_days: usize,
}

impl<'a> DailySeriesBuilder<'a> {
    pub const fn new(ledger: &'a Ledger, calendar: OperationalCalendar) -> Self {
        Self {
            ledger,
            calendar,
            max_parallel_days: 0,
        }
    }

    /// Caps the number of days evaluated concurrently. 0 uses the rayon default.
    #[must_use]
    pub const fn max_parallel_days(mut self, max: usize) -> Self {
        self.max_parallel_days = max;
        self
    }

    /// Daily consumption of `material_id` for `YYYY-MM-DD` dates `start..=end`.
    ///
    /// Malformed dates or `start > end` yield an empty series.
    pub fn consumption(
        &self,
        material_id: MaterialId,
        start: &str,
        end: &str,
    ) -> Result<Vec<DailyConsumptionPoint>, CoreError> {
        self.fan_out(start, end, |window| consumption_for_window(self.ledger, material_id, window))
    }

    /// Daily acid production for `YYYY-MM-DD` dates `start..=end`.
    ///
    /// Malformed dates or `start > end` yield an empty series.
    pub fn production(
        &self,
        materials: &ProductionMaterials,
        start: &str,
        end: &str,
    ) -> Result<Vec<DailyProductionPoint>, CoreError> {
        self.fan_out(start, end, |window| production_for_window(self.ledger, materials, window))
    }

    fn fan_out<T, F>(&self, start: &str, end: &str, evaluate: F) -> Result<Vec<T>, CoreError>
    where
        T: Send,
        F: Fn(&OperationalWindow) -> T + Sync,
    {
        let (Some(start_date), Some(end_date)) = (parse_date_only(start), parse_date_only(end)) else {
            tracing::debug!(start, end, "malformed date range, returning empty series");
            return Ok(Vec::new());
        };
        let days = days_inclusive(start_date, end_date);
        if days.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_parallel_days)
            .build()
            .map_err(|err| CoreError::WorkerPool(err.to_string()))?;
        tracing::debug!(days = days.len(), threads = pool.current_num_threads(), "evaluating daily series");

        let calendar = self.calendar;
        let mut points: Vec<_> = pool.install(|| {
            days.par_iter()
                .map(|day| {
                    let window = calendar.window(*day);
                    (window.date, evaluate(&window))
                })
                .collect()
        });
        points.sort_by_key(|(date, _)| *date);
        Ok(points.into_iter().map(|(_, point)| point).collect())
    }
}

/// Consumption of `material_id` over one window.
pub fn consumption_for_window(
    ledger: &Ledger,
    material_id: MaterialId,
    window: &OperationalWindow,
) -> DailyConsumptionPoint {
    let value = ledger.delta(material_id, window.start, window.end, BalanceKind::Consumption);
    DailyConsumptionPoint {
        date: format_date(window.date),
        window_start: format_instant(window.start),
        window_end: format_instant(window.end),
        value: round2(value),
    }
}

/// Production of the three acid grades over one window.
///
/// `total98_equivalent = acid98 + fuming * (fuming% / acid98%) + reagent`.
pub fn production_for_window(
    ledger: &Ledger,
    materials: &ProductionMaterials,
    window: &OperationalWindow,
) -> DailyProductionPoint {
    let produced = |material_id| ledger.delta(material_id, window.start, window.end, BalanceKind::Production);
    let (acid98, (fuming_acid, reagent_acid)) = rayon::join(
        || produced(materials.acid98.material_id),
        || {
            rayon::join(
                || produced(materials.fuming_acid.material_id),
                || produced(materials.reagent_acid.material_id),
            )
        },
    );

    let total_raw = acid98 + fuming_acid + reagent_acid;
    let fuming_ratio = materials.fuming_acid.concentration / materials.acid98.concentration;
    let total98_equivalent = acid98 + fuming_acid * fuming_ratio + reagent_acid;

    DailyProductionPoint {
        date: format_date(window.date),
        window_start: format_instant(window.start),
        window_end: format_instant(window.end),
        acid98: round2(acid98),
        fuming_acid: round2(fuming_acid),
        reagent_acid: round2(reagent_acid),
        total_raw: round2(total_raw),
        total98_equivalent: round2(total98_equivalent),
    }
}
