//! Status command for showing record counts and freshness.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use plant_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let status = db.status().context("failed to read store status")?;
    let latest = |value: Option<String>| value.unwrap_or_else(|| "never".to_string());

    writeln!(writer, "Plant status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Meter table: {}", status.meter_table.as_str())?;
    writeln!(writer, "Materials: {}", status.materials)?;
    writeln!(writer, "Tanks: {}", status.tanks)?;
    writeln!(
        writer,
        "Tank readings: {} (latest: {})",
        status.tank_readings,
        latest(status.latest_tank_reading)
    )?;
    writeln!(writer, "Material flows: {}", status.material_flows)?;
    writeln!(writer, "Meters: {}", status.meters)?;
    writeln!(
        writer,
        "Meter readings: {} (latest: {})",
        status.meter_readings,
        latest(status.latest_meter_reading)
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;
    use plant_core::{CounterReading, MeterId};
    use plant_db::{MeterRecord, RecordBatch};

    #[test]
    fn status_command_outputs_counts() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("plant.db");
        let mut db = Database::open(&db_path).unwrap();
        db.insert_batch(&RecordBatch {
            meters: vec![MeterRecord {
                id: MeterId::new(1),
                name: "1#电炉".to_string(),
                unit: Some("kWh".to_string()),
                multiplier: None,
            }],
            meter_readings: vec![CounterReading {
                meter_id: MeterId::new(1),
                value: 10.0,
                is_reset: false,
                recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap(),
            }],
            ..RecordBatch::default()
        })
        .unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &db_path).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&db_path.display().to_string(), "[TEMP]/plant.db");
        assert_snapshot!(output, @r"
        Plant status
        Database: [TEMP]/plant.db
        Meter table: meters
        Materials: 0
        Tanks: 0
        Tank readings: 0 (latest: never)
        Material flows: 0
        Meters: 1
        Meter readings: 1 (latest: 2024-03-01T15:00:00.000Z)
        ");
    }
}
