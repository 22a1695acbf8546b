//! Daily consumption series.

use std::io::Write;

use anyhow::{Context, Result};

use plant_core::{DailySeriesBuilder, PlantConfig};
use plant_db::Database;

use crate::DateRangeArgs;
use crate::commands::util::{DateRange, plant_calendar, write_data};

pub fn run<W: Write>(writer: &mut W, db: &Database, plant: &PlantConfig, args: &DateRangeArgs) -> Result<()> {
    let range = DateRange::parse(args)?;
    let calendar = plant_calendar(plant)?;
    let material_id = plant.consumption_material_id;

    let (from, to) = range.window_bounds(&calendar);
    let ledger = db
        .load_ledger(&[material_id], from, to)
        .context("failed to load stock records")?;
    let series = DailySeriesBuilder::new(&ledger, calendar)
        .max_parallel_days(plant.max_parallel_days)
        .consumption(material_id, &args.start, &args.end)?;

    tracing::info!(%material_id, days = series.len(), "computed consumption series");
    write_data(writer, &series)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use insta::assert_snapshot;
    use plant_core::{MaterialId, StockSnapshot, VesselId};
    use plant_db::{FlowEntry, RecordBatch, TankRecord};

    fn local(day: u32, hour: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 2, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn plant() -> PlantConfig {
        PlantConfig {
            utc_offset_minutes: Some(480),
            ..PlantConfig::default()
        }
    }

    fn run_to_string(db: &Database, start: &str, end: &str) -> Result<String> {
        let args = DateRangeArgs {
            start: start.to_string(),
            end: end.to_string(),
        };
        let mut output = Vec::new();
        run(&mut output, db, &plant(), &args)?;
        Ok(String::from_utf8(output)?)
    }

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let reading = |day: u32, level: f64| StockSnapshot {
            vessel_id: VesselId::new(1),
            level_percent: level,
            recorded_at: local(day, 8),
        };
        db.insert_batch(&RecordBatch {
            tanks: vec![TankRecord {
                id: VesselId::new(1),
                name: "双氧水罐".to_string(),
                material_id: MaterialId::new(4),
                capacity: 100.0,
                updated_at: local(1, 0),
            }],
            tank_readings: vec![reading(10, 50.0), reading(11, 30.0)],
            flows: vec![FlowEntry {
                material_id: MaterialId::new(4),
                amount: 10.0,
                unit: "吨".to_string(),
                flow_type: "采购入库".to_string(),
                occurred_at: local(10, 12),
            }],
            ..RecordBatch::default()
        })
        .unwrap();
        db
    }

    #[test]
    fn consumption_outputs_daily_points() {
        let db = seeded_db();
        let output = run_to_string(&db, "2024-02-10", "2024-02-11").unwrap();
        assert_snapshot!(output, @r#"{"data":[{"date":"2024-02-10","windowStart":"2024-02-10T00:00:00.000Z","windowEnd":"2024-02-11T00:00:00.000Z","value":30},{"date":"2024-02-11","windowStart":"2024-02-11T00:00:00.000Z","windowEnd":"2024-02-12T00:00:00.000Z","value":0}]}"#);
    }

    #[test]
    fn reversed_range_outputs_empty_data() {
        let db = seeded_db();
        let output = run_to_string(&db, "2024-02-10", "2024-02-05").unwrap();
        assert_eq!(output, "{\"data\":[]}\n");
    }

    #[test]
    fn malformed_date_is_rejected_before_output() {
        let db = seeded_db();
        let err = run_to_string(&db, "10/02/2024", "2024-02-11").unwrap_err();
        assert!(err.to_string().contains("invalid --start"));
    }
}
