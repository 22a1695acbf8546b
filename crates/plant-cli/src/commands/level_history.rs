//! Resampled tank level history.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use plant_core::{LevelHistory, LevelHistoryRequest, PlantConfig, resample};
use plant_db::Database;

use crate::LevelHistoryArgs;
use crate::commands::util::{parse_datetime, write_data};

pub fn run<W: Write>(writer: &mut W, db: &Database, plant: &PlantConfig, args: &LevelHistoryArgs) -> Result<()> {
    run_at(writer, db, plant, args, Utc::now())
}

fn run_at<W: Write>(
    writer: &mut W,
    db: &Database,
    plant: &PlantConfig,
    args: &LevelHistoryArgs,
    now: DateTime<Utc>,
) -> Result<()> {
    let end = args
        .end
        .as_deref()
        .map(parse_datetime)
        .transpose()
        .context("invalid --end")?;
    let request = LevelHistoryRequest {
        hours: args.hours,
        bucket_minutes: args.bucket_minutes,
        limit: args.limit,
        end,
        all: args.all,
    };
    let earliest = if request.all {
        db.earliest_tank_reading()
            .context("failed to find earliest tank reading")?
    } else {
        None
    };
    let window = request.resolve(&plant.level_history, now, earliest)?;

    let readings = db
        .tank_readings_between(window.start, window.end)
        .context("failed to load tank readings")?;
    let buckets = resample(&readings, window.start, window.end, window.bucket_seconds, window.limit)?;
    let tanks = db.tank_basics().context("failed to load tanks")?;

    tracing::info!(
        readings = readings.len(),
        buckets = buckets.len(),
        limit = window.limit,
        "resampled tank levels"
    );
    write_data(writer, &LevelHistory::new(&window, tanks, buckets))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use insta::assert_snapshot;
    use plant_core::{MaterialId, StockSnapshot, VesselId};
    use plant_db::{RecordBatch, TankRecord};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, hour, minute, 0).unwrap()
    }

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let level = |tank: i64, instant, percent| StockSnapshot {
            vessel_id: VesselId::new(tank),
            level_percent: percent,
            recorded_at: instant,
        };
        db.insert_batch(&RecordBatch {
            tanks: vec![
                TankRecord {
                    id: VesselId::new(1),
                    name: "1#罐".to_string(),
                    material_id: MaterialId::new(1),
                    capacity: 100.0,
                    updated_at: at(0, 0),
                },
                TankRecord {
                    id: VesselId::new(2),
                    name: "2#罐".to_string(),
                    material_id: MaterialId::new(1),
                    capacity: 100.0,
                    updated_at: at(0, 0),
                },
            ],
            tank_readings: vec![
                level(1, at(6, 10), 40.0),
                level(1, at(6, 50), 42.0),
                level(2, at(6, 30), 80.0),
                level(1, at(7, 5), 45.5),
            ],
            ..RecordBatch::default()
        })
        .unwrap();
        db
    }

    fn run_to_string(args: &LevelHistoryArgs) -> Result<String> {
        let db = seeded_db();
        let mut output = Vec::new();
        run_at(&mut output, &db, &PlantConfig::default(), args, at(8, 0))?;
        Ok(String::from_utf8(output)?)
    }

    #[test]
    fn default_window_covers_last_day() {
        let output = run_to_string(&LevelHistoryArgs::default()).unwrap();
        assert_snapshot!(output, @r#"{"data":{"start":"2024-02-09T08:00:00.000Z","end":"2024-02-10T08:00:00.000Z","bucketMinutes":60,"tanks":[{"id":1,"name":"1#罐"},{"id":2,"name":"2#罐"}],"rows":[{"timestamp":"2024-02-10T06:00:00.000Z","levels":{"1":41,"2":80}},{"timestamp":"2024-02-10T07:00:00.000Z","levels":{"1":45.5}}]}}"#);
    }

    #[test]
    fn all_history_starts_at_first_reading_and_honors_limit() {
        let args = LevelHistoryArgs {
            all: true,
            bucket_minutes: Some(30),
            limit: Some(1),
            end: Some("2024-02-10T08:00:00Z".to_string()),
            ..LevelHistoryArgs::default()
        };
        let output = run_to_string(&args).unwrap();
        assert_snapshot!(output, @r#"{"data":{"start":"2024-02-10T06:10:00.000Z","end":"2024-02-10T08:00:00.000Z","bucketMinutes":30,"tanks":[{"id":1,"name":"1#罐"},{"id":2,"name":"2#罐"}],"rows":[{"timestamp":"2024-02-10T06:00:00.000Z","levels":{"1":40}}]}}"#);
    }

    #[test]
    fn rejects_non_positive_bucket() {
        let args = LevelHistoryArgs {
            bucket_minutes: Some(0),
            ..LevelHistoryArgs::default()
        };
        assert!(run_to_string(&args).is_err());
    }

    #[test]
    fn rejects_oversized_hours_and_bucket_without_output() {
        for args in [
            LevelHistoryArgs {
                hours: Some(2_500_000_000),
                ..LevelHistoryArgs::default()
            },
            LevelHistoryArgs {
                bucket_minutes: Some(i64::MAX / 2),
                ..LevelHistoryArgs::default()
            },
        ] {
            let db = seeded_db();
            let mut output = Vec::new();
            let err = run_at(&mut output, &db, &PlantConfig::default(), &args, at(8, 0)).unwrap_err();
            assert!(err.to_string().contains("out of range"), "unexpected error: {err}");
            assert!(output.is_empty());
        }
    }

    #[test]
    fn rejects_unparseable_end() {
        let args = LevelHistoryArgs {
            end: Some("soon".to_string()),
            ..LevelHistoryArgs::default()
        };
        let err = run_to_string(&args).unwrap_err();
        assert!(err.to_string().contains("invalid --end"));
    }
}
