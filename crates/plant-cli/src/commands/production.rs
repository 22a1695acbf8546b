//! Daily acid production series.

use std::io::Write;

use anyhow::{Context, Result};

use plant_core::{DailySeriesBuilder, PlantConfig};
use plant_db::Database;

use crate::DateRangeArgs;
use crate::commands::util::{DateRange, plant_calendar, write_data};

pub fn run<W: Write>(writer: &mut W, db: &Database, plant: &PlantConfig, args: &DateRangeArgs) -> Result<()> {
    let range = DateRange::parse(args)?;
    let calendar = plant_calendar(plant)?;
    let grades = &plant.production;
    let materials = [
        grades.acid98.material_id,
        grades.fuming_acid.material_id,
        grades.reagent_acid.material_id,
    ];

    let (from, to) = range.window_bounds(&calendar);
    let ledger = db
        .load_ledger(&materials, from, to)
        .context("failed to load stock records")?;
    let series = DailySeriesBuilder::new(&ledger, calendar)
        .max_parallel_days(plant.max_parallel_days)
        .production(grades, &args.start, &args.end)?;

    tracing::info!(days = series.len(), "computed production series");
    write_data(writer, &series)
}
