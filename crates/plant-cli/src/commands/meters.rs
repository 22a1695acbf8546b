//! Daily utility totals from meter counters.

use std::io::Write;

use anyhow::{Context, Result};

use plant_core::{
    MeterSeries, MeterWeights, NetUsageAggregator, NetUsagePoint, OperationalCalendar, PlantConfig,
    daily_usage,
};
use plant_db::Database;

use crate::DateRangeArgs;
use crate::commands::util::{DateRange, plant_calendar, write_data};

/// Net electricity usage of the configured meters.
pub fn electric<W: Write>(
    writer: &mut W,
    db: &Database,
    plant: &PlantConfig,
    args: &DateRangeArgs,
) -> Result<()> {
    let range = DateRange::parse(args)?;
    let calendar = plant_calendar(plant)?;
    let names: Vec<String> = plant.electric_meters.keys().cloned().collect();

    let (from, to) = range.reading_bounds(&calendar);
    let series = db
        .meter_series_by_names(&names, from, to)
        .context("failed to load electric meter readings")?;
    let points = net_usage(&series, &calendar, range, &plant.electric_weights(), plant);

    tracing::info!(meters = series.len(), days = points.len(), "computed electric usage");
    write_data(writer, &points)
}

/// Total usage of every meter measured in a water unit.
pub fn water<W: Write>(
    writer: &mut W,
    db: &Database,
    plant: &PlantConfig,
    args: &DateRangeArgs,
) -> Result<()> {
    let range = DateRange::parse(args)?;
    let calendar = plant_calendar(plant)?;

    let (from, to) = range.reading_bounds(&calendar);
    let series = db
        .meter_series_by_units(&plant.water_units, from, to)
        .context("failed to load water meter readings")?;
    let points = net_usage(&series, &calendar, range, &MeterWeights::include_all(), plant);

    tracing::info!(meters = series.len(), days = points.len(), "computed water usage");
    write_data(writer, &points)
}

fn net_usage(
    series: &[MeterSeries],
    calendar: &OperationalCalendar,
    range: DateRange,
    weights: &MeterWeights,
    plant: &PlantConfig,
) -> Vec<NetUsagePoint> {
    let usages = series
        .iter()
        .flat_map(|meter| daily_usage(meter, calendar, range.start, range.end));
    NetUsageAggregator::new(weights, plant.missing_meter_policy).aggregate(usages)
}
