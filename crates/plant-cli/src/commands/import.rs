//! Import command for loading plant records into the local `SQLite` store.
//!
//! Input is JSONL, one record per line, tagged by `kind`:
//!
//! ```text
//! {"kind":"material","id":4,"name":"双氧水","density":1.13}
//! {"kind":"tank","id":1,"name":"1#罐","material_id":4,"capacity":100}
//! {"kind":"tank_reading","tank_id":1,"level_percent":50,"recorded_at":"2024-02-10T08:00:00+08:00"}
//! {"kind":"flow","material_id":4,"amount":10,"unit":"吨","flow_type":"采购入库","occurred_at":"..."}
//! {"kind":"meter","id":1,"name":"1#变压器","unit":"kWh","multiplier":80}
//! {"kind":"meter_reading","meter_id":1,"value":1234.5,"is_reset":false,"recorded_at":"..."}
//! ```

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use plant_core::{CounterReading, MaterialId, MaterialMeta, MeterId, StockSnapshot, VesselId};
use plant_db::{BatchStats, Database, FlowEntry, MeterRecord, RecordBatch, TankRecord};

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub stats: BatchStats,
    pub malformed: usize,
}

impl ImportSummary {
    pub const fn new_records(&self) -> usize {
        let stats = &self.stats;
        stats.materials + stats.tanks + stats.meters + stats.tank_readings + stats.flows + stats.meter_readings
    }
}

/// Reads records from `reader`, writes them in one batch and reports the
/// outcome to `report`. Malformed lines are skipped and counted.
pub fn run<R: BufRead, W: Write>(reader: R, report: &mut W, db: &mut Database) -> Result<ImportSummary> {
    let (batch, malformed) = parse_records(reader, Utc::now())?;
    let stats = db.insert_batch(&batch).context("failed to store records")?;
    let summary = ImportSummary { stats, malformed };

    writeln!(report, "Imported {} new records", summary.new_records())?;
    if malformed > 0 {
        writeln!(report, "Skipped {malformed} malformed lines")?;
    }
    Ok(summary)
}

fn parse_records<R: BufRead>(reader: R, now: DateTime<Utc>) -> Result<(RecordBatch, usize)> {
    let mut batch = RecordBatch::default();
    let mut malformed = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ImportRecord>(trimmed) {
            Ok(record) => record.push_into(&mut batch, now),
            Err(err) => {
                tracing::warn!(line = idx + 1, error = %err, "skipping malformed record");
                malformed += 1;
            }
        }
    }
    Ok((batch, malformed))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ImportRecord {
    Material {
        id: i64,
        name: String,
        #[serde(default)]
        density: Option<f64>,
        #[serde(default)]
        concentration: Option<f64>,
    },
    Tank {
        id: i64,
        name: String,
        material_id: i64,
        capacity: f64,
        /// Defaults to the time of import.
        #[serde(default)]
        updated_at: Option<DateTime<Utc>>,
    },
    TankReading {
        tank_id: i64,
        level_percent: f64,
        recorded_at: DateTime<Utc>,
    },
    Flow {
        material_id: i64,
        amount: f64,
        unit: String,
        flow_type: String,
        occurred_at: DateTime<Utc>,
    },
    Meter {
        id: i64,
        name: String,
        #[serde(default)]
        unit: Option<String>,
        #[serde(default)]
        multiplier: Option<f64>,
    },
    MeterReading {
        meter_id: i64,
        value: f64,
        #[serde(default)]
        is_reset: bool,
        recorded_at: DateTime<Utc>,
    },
}

impl ImportRecord {
    fn push_into(self, batch: &mut RecordBatch, now: DateTime<Utc>) {
        match self {
            Self::Material {
                id,
                name,
                density,
                concentration,
            } => batch.materials.push(MaterialMeta {
                id: MaterialId::new(id),
                name,
                density,
                concentration,
            }),
            Self::Tank {
                id,
                name,
                material_id,
                capacity,
                updated_at,
            } => batch.tanks.push(TankRecord {
                id: VesselId::new(id),
                name,
                material_id: MaterialId::new(material_id),
                capacity,
                updated_at: updated_at.unwrap_or(now),
            }),
            Self::TankReading {
                tank_id,
                level_percent,
                recorded_at,
            } => batch.tank_readings.push(StockSnapshot {
                vessel_id: VesselId::new(tank_id),
                level_percent,
                recorded_at,
            }),
            Self::Flow {
                material_id,
                amount,
                unit,
                flow_type,
                occurred_at,
            } => batch.flows.push(FlowEntry {
                material_id: MaterialId::new(material_id),
                amount,
                unit,
                flow_type,
                occurred_at,
            }),
            Self::Meter {
                id,
                name,
                unit,
                multiplier,
            } => batch.meters.push(MeterRecord {
                id: MeterId::new(id),
                name,
                unit,
                multiplier,
            }),
            Self::MeterReading {
                meter_id,
                value,
                is_reset,
                recorded_at,
            } => batch.meter_readings.push(CounterReading {
                meter_id: MeterId::new(meter_id),
                value,
                is_reset,
                recorded_at,
            }),
        }
    }
}
