//! Storage layer for plant records.
//!
//! Persists tanks, level readings, material flows and utility meter readings
//! using `rusqlite`, and loads them back into the shapes the derivation core
//! consumes.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Queries copy rows into owned values (for example a [`Ledger`]), so the
//! computation that follows can fan out across threads without touching the
//! connection.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g., `2024-02-10T00:00:00.000Z`). Every write goes through the same
//! formatter, so lexicographic ordering matches chronological ordering and
//! range filters can compare the text directly.
//!
//! ## Meter Tables
//!
//! Meter metadata lives either in `meters` (created by this crate) or in a
//! legacy `utility_meters` table keyed by `meter_id` that may lack the `unit`
//! and `multiplier` columns. The shape is detected once when the database is
//! opened and recorded in [`MeterSchema`].

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use thiserror::Error;

use plant_core::{
    CounterReading, FlowRecord, Ledger, MaterialId, MaterialMeta, MeterId, MeterSeries,
    StockSnapshot, TankBasic, TankLevel, UnitKind, Vessel, VesselId,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp is not valid RFC 3339.
    #[error("invalid timestamp in {table}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A query needs a column the deployed schema does not have.
    #[error("table {table} has no {column} column")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Table holding meter metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterTable {
    Meters,
    /// Legacy name used by older deployments.
    UtilityMeters,
}

impl MeterTable {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Meters => "meters",
            Self::UtilityMeters => "utility_meters",
        }
    }
}

/// Shape of the meter metadata table, resolved once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterSchema {
    pub table: MeterTable,
    /// Either `id` or `meter_id`.
    pub id_column: &'static str,
    pub has_multiplier: bool,
    pub has_unit: bool,
}

impl MeterSchema {
    fn detect(conn: &Connection) -> Result<Self, DbError> {
        let table = if table_exists(conn, MeterTable::Meters.as_str())? {
            MeterTable::Meters
        } else if table_exists(conn, MeterTable::UtilityMeters.as_str())? {
            MeterTable::UtilityMeters
        } else {
            MeterTable::Meters
        };
        let columns = column_names(conn, table.as_str())?;
        let id_column = if !columns.contains("id") && columns.contains("meter_id") {
            "meter_id"
        } else {
            "id"
        };
        Ok(Self {
            table,
            id_column,
            has_multiplier: columns.contains("multiplier"),
            has_unit: columns.contains("unit"),
        })
    }

    fn multiplier_expr(&self) -> &'static str {
        if self.has_multiplier { "m.multiplier" } else { "NULL" }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    meter_schema: MeterSchema,
}

/// A tank as stored, with the time its metadata last changed.
#[derive(Debug, Clone, PartialEq)]
pub struct TankRecord {
    pub id: VesselId,
    pub name: String,
    pub material_id: MaterialId,
    pub capacity: f64,
    pub updated_at: DateTime<Utc>,
}

/// A material ledger entry with its free-text unit and type.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEntry {
    pub material_id: MaterialId,
    pub amount: f64,
    pub unit: String,
    pub flow_type: String,
    pub occurred_at: DateTime<Utc>,
}

/// Meter metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterRecord {
    pub id: MeterId,
    pub name: String,
    pub unit: Option<String>,
    pub multiplier: Option<f64>,
}

/// Records to write in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub materials: Vec<MaterialMeta>,
    pub tanks: Vec<TankRecord>,
    pub meters: Vec<MeterRecord>,
    pub tank_readings: Vec<StockSnapshot>,
    pub flows: Vec<FlowEntry>,
    pub meter_readings: Vec<CounterReading>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
            && self.tanks.is_empty()
            && self.meters.is_empty()
            && self.tank_readings.is_empty()
            && self.flows.is_empty()
            && self.meter_readings.is_empty()
    }
}

/// Rows written per record kind. Duplicate readings and flows are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub materials: usize,
    pub tanks: usize,
    pub meters: usize,
    pub tank_readings: usize,
    pub flows: usize,
    pub meter_readings: usize,
}

/// Row counts and freshness of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub meter_table: MeterTable,
    pub materials: i64,
    pub tanks: i64,
    pub tank_readings: i64,
    pub material_flows: i64,
    pub meters: i64,
    pub meter_readings: i64,
    pub latest_tank_reading: Option<String>,
    pub latest_meter_reading: Option<String>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Initializes the schema and resolves the meter table shape.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS materials (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                density REAL,
                concentration REAL
            );

            CREATE TABLE IF NOT EXISTS tanks (
                tank_id INTEGER PRIMARY KEY,
                tank_name TEXT NOT NULL,
                material_id INTEGER NOT NULL,
                capacity REAL NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tanks_material ON tanks(material_id);

            -- level_percent: 0-100, not enforced
            CREATE TABLE IF NOT EXISTS tank_readings (
                tank_id INTEGER NOT NULL,
                level_percent REAL NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (tank_id, recorded_at)
            );

            CREATE INDEX IF NOT EXISTS idx_tank_readings_recorded ON tank_readings(recorded_at);

            -- unit and flow_type keep the source ledger's free text
            CREATE TABLE IF NOT EXISTS material_flows (
                material_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                unit TEXT NOT NULL,
                flow_type TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                UNIQUE (material_id, occurred_at, flow_type, amount, unit)
            );

            CREATE INDEX IF NOT EXISTS idx_material_flows_material_time
                ON material_flows(material_id, occurred_at);

            CREATE TABLE IF NOT EXISTS meter_readings (
                meter_id INTEGER NOT NULL,
                reading_value REAL NOT NULL,
                is_reset INTEGER NOT NULL DEFAULT 0,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (meter_id, recorded_at)
            );
            ",
        )?;
        if !table_exists(&conn, MeterTable::UtilityMeters.as_str())? {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS meters (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    unit TEXT,
                    multiplier REAL
                );
                ",
            )?;
        }

        let meter_schema = MeterSchema::detect(&conn)?;
        tracing::debug!(?meter_schema, "resolved meter schema");
        Ok(Self { conn, meter_schema })
    }

    /// The meter table shape detected at open.
    pub const fn meter_schema(&self) -> &MeterSchema {
        &self.meter_schema
    }

    /// Writes a batch in one transaction.
    ///
    /// Metadata rows are upserted by id; readings and flows already present
    /// are ignored.
    pub fn insert_batch(&mut self, batch: &RecordBatch) -> Result<BatchStats, DbError> {
        if batch.is_empty() {
            return Ok(BatchStats::default());
        }
        let schema = self.meter_schema;
        let tx = self.conn.transaction()?;
        let stats = BatchStats {
            materials: upsert_materials(&tx, &batch.materials)?,
            tanks: upsert_tanks(&tx, &batch.tanks)?,
            meters: upsert_meters(&tx, &schema, &batch.meters)?,
            tank_readings: insert_tank_readings(&tx, &batch.tank_readings)?,
            flows: insert_flows(&tx, &batch.flows)?,
            meter_readings: insert_meter_readings(&tx, &batch.meter_readings)?,
        };
        tx.commit()?;
        tracing::debug!(?stats, "inserted record batch");
        Ok(stats)
    }

    /// Loads everything needed to evaluate `materials` over `[start, end]`.
    ///
    /// Each tank gets its latest reading at or before `start` plus every
    /// reading in `(start, end]`; flows are those in `[start, end)`.
    pub fn load_ledger(
        &self,
        materials: &[MaterialId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Ledger, DbError> {
        let mut builder = Ledger::builder();
        for &material_id in materials {
            if let Some(meta) = self.material(material_id)? {
                builder = builder.material(meta);
            }
            for vessel in self.vessels_for(material_id)? {
                builder = builder
                    .snapshots(self.snapshots_for(vessel.id, start, end)?)
                    .vessel(vessel);
            }
            builder = builder.flows(self.flows_between(material_id, start, end)?);
        }
        Ok(builder.build())
    }

    fn material(&self, material_id: MaterialId) -> Result<Option<MaterialMeta>, DbError> {
        let meta = self
            .conn
            .query_row(
                "SELECT id, name, density, concentration FROM materials WHERE id = ?",
                [material_id.get()],
                |row| {
                    Ok(MaterialMeta {
                        id: MaterialId::new(row.get(0)?),
                        name: row.get(1)?,
                        density: row.get(2)?,
                        concentration: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    fn vessels_for(&self, material_id: MaterialId) -> Result<Vec<Vessel>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT tank_id, tank_name, material_id, capacity
            FROM tanks
            WHERE material_id = ?
            ORDER BY tank_id ASC
            ",
        )?;
        let rows = stmt.query_map([material_id.get()], |row| {
            Ok(Vessel {
                id: VesselId::new(row.get(0)?),
                name: row.get(1)?,
                material_id: MaterialId::new(row.get(2)?),
                capacity: row.get(3)?,
            })
        })?;
        let mut vessels = Vec::new();
        for row in rows {
            vessels.push(row?);
        }
        Ok(vessels)
    }

    fn snapshots_for(
        &self,
        vessel_id: VesselId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StockSnapshot>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT level_percent, recorded_at FROM (
                SELECT level_percent, recorded_at
                FROM tank_readings
                WHERE tank_id = ?1 AND recorded_at <= ?2
                ORDER BY recorded_at DESC
                LIMIT 1
            )
            UNION ALL
            SELECT level_percent, recorded_at
            FROM tank_readings
            WHERE tank_id = ?1 AND recorded_at > ?2 AND recorded_at <= ?3
            ",
        )?;
        let rows = stmt.query_map(
            params![vessel_id.get(), format_timestamp(start), format_timestamp(end)],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?)),
        )?;
        let mut snapshots = Vec::new();
        for row in rows {
            let (level_percent, recorded_at) = row?;
            snapshots.push(StockSnapshot {
                vessel_id,
                level_percent,
                recorded_at: parse_timestamp("tank_readings", &recorded_at)?,
            });
        }
        Ok(snapshots)
    }

    fn flows_between(
        &self,
        material_id: MaterialId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FlowRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT amount, unit, flow_type, occurred_at
            FROM material_flows
            WHERE material_id = ? AND occurred_at >= ? AND occurred_at < ?
            ORDER BY occurred_at ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![material_id.get(), format_timestamp(start), format_timestamp(end)],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;
        let mut flows = Vec::new();
        for row in rows {
            let (amount, unit, flow_type, occurred_at) = row?;
            let occurred_at = parse_timestamp("material_flows", &occurred_at)?;
            let record = FlowRecord::classify(material_id, amount, &unit, &flow_type, occurred_at);
            if record.unit == UnitKind::Unknown {
                tracing::warn!(%material_id, unit = %unit, "unrecognized flow unit, amount taken as mass");
            }
            tracing::debug!(
                %material_id,
                unit = %record.unit,
                kind = %record.kind,
                amount,
                "classified material flow"
            );
            flows.push(record);
        }
        Ok(flows)
    }

    /// Lists tank ids and names ordered by id.
    pub fn tank_basics(&self) -> Result<Vec<TankBasic>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tank_id, tank_name FROM tanks ORDER BY tank_id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(TankBasic {
                id: VesselId::new(row.get(0)?),
                name: row.get(1)?,
            })
        })?;
        let mut tanks = Vec::new();
        for row in rows {
            tanks.push(row?);
        }
        Ok(tanks)
    }

    /// Timestamp of the oldest tank reading, if any.
    pub fn earliest_tank_reading(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let earliest: Option<String> =
            self.conn
                .query_row("SELECT MIN(recorded_at) FROM tank_readings", [], |row| row.get(0))?;
        earliest
            .map(|timestamp| parse_timestamp("tank_readings", &timestamp))
            .transpose()
    }

    /// Lists tank readings within a time range.
    ///
    /// The range is inclusive of both `start` and `end`.
    pub fn tank_readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StockSnapshot>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT tank_id, level_percent, recorded_at
            FROM tank_readings
            WHERE recorded_at >= ? AND recorded_at <= ?
            ORDER BY recorded_at ASC, tank_id ASC
            ",
        )?;
        let rows = stmt.query_map([format_timestamp(start), format_timestamp(end)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut readings = Vec::new();
        for row in rows {
            let (tank_id, level_percent, recorded_at) = row?;
            readings.push(StockSnapshot {
                vessel_id: VesselId::new(tank_id),
                level_percent,
                recorded_at: parse_timestamp("tank_readings", &recorded_at)?,
            });
        }
        Ok(readings)
    }

    /// Every tank with its latest reading, ordered by material then tank.
    pub fn tank_levels(&self) -> Result<Vec<TankLevel>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT
                t.tank_id,
                t.tank_name,
                t.material_id,
                mt.name,
                t.capacity,
                COALESCE(r.level_percent, 0),
                COALESCE(r.recorded_at, t.updated_at)
            FROM tanks t
            LEFT JOIN materials mt ON mt.id = t.material_id
            LEFT JOIN tank_readings r ON r.tank_id = t.tank_id
                AND r.recorded_at = (
                    SELECT MAX(recorded_at) FROM tank_readings WHERE tank_id = t.tank_id
                )
            ORDER BY t.material_id ASC, t.tank_id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut levels = Vec::new();
        for row in rows {
            let (tank_id, tank_name, material_id, material_name, capacity, level_percent, updated_at) =
                row?;
            levels.push(TankLevel {
                tank_id: VesselId::new(tank_id),
                tank_name,
                material_id: MaterialId::new(material_id),
                material_name,
                capacity,
                level_percent,
                updated_at: parse_timestamp("tanks", &updated_at)?,
            });
        }
        Ok(levels)
    }

    /// Meters named in `names`, each with its readings in `[start, end)`.
    pub fn meter_series_by_names(
        &self,
        names: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MeterSeries>, DbError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let schema = &self.meter_schema;
        let sql = format!(
            "SELECT m.{id}, m.name, {multiplier} FROM {table} m WHERE m.name IN ({list}) ORDER BY m.{id} ASC",
            id = schema.id_column,
            multiplier = schema.multiplier_expr(),
            table = schema.table.as_str(),
            list = placeholders(names.len()),
        );
        self.meter_series(&sql, names, start, end)
    }

    /// Meters whose trimmed unit is one of `units`, each with its readings
    /// in `[start, end)`.
    ///
    /// Fails with [`DbError::MissingColumn`] when the meter table has no
    /// `unit` column.
    pub fn meter_series_by_units(
        &self,
        units: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MeterSeries>, DbError> {
        let schema = &self.meter_schema;
        if !schema.has_unit {
            return Err(DbError::MissingColumn {
                table: schema.table.as_str(),
                column: "unit",
            });
        }
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT m.{id}, m.name, {multiplier} FROM {table} m WHERE trim(m.unit) IN ({list}) ORDER BY m.{id} ASC",
            id = schema.id_column,
            multiplier = schema.multiplier_expr(),
            table = schema.table.as_str(),
            list = placeholders(units.len()),
        );
        self.meter_series(&sql, units, start, end)
    }

    fn meter_series(
        &self,
        meters_sql: &str,
        filter: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MeterSeries>, DbError> {
        let mut stmt = self.conn.prepare(meters_sql)?;
        let rows = stmt.query_map(params_from_iter(filter.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?;
        let mut meters = Vec::new();
        for row in rows {
            meters.push(row?);
        }

        let mut series = Vec::with_capacity(meters.len());
        for (id, name, multiplier) in meters {
            let meter_id = MeterId::new(id);
            let readings = self.meter_readings(meter_id, start, end)?;
            tracing::debug!(meter = %name, readings = readings.len(), "loaded meter readings");
            series.push(MeterSeries {
                meter_id,
                name,
                multiplier,
                readings,
            });
        }
        Ok(series)
    }

    fn meter_readings(
        &self,
        meter_id: MeterId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CounterReading>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT reading_value, is_reset, recorded_at
            FROM meter_readings
            WHERE meter_id = ? AND recorded_at >= ? AND recorded_at < ?
            ORDER BY recorded_at ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![meter_id.get(), format_timestamp(start), format_timestamp(end)],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;
        let mut readings = Vec::new();
        for row in rows {
            let (value, is_reset, recorded_at) = row?;
            readings.push(CounterReading {
                meter_id,
                value,
                is_reset,
                recorded_at: parse_timestamp("meter_readings", &recorded_at)?,
            });
        }
        Ok(readings)
    }

    /// Row counts per table and the latest reading timestamps.
    pub fn status(&self) -> Result<StoreStatus, DbError> {
        let count = |table: &str| -> Result<i64, DbError> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
        };
        let latest = |table: &str| -> Result<Option<String>, DbError> {
            let sql = format!("SELECT MAX(recorded_at) FROM {table}");
            Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
        };
        Ok(StoreStatus {
            meter_table: self.meter_schema.table,
            materials: count("materials")?,
            tanks: count("tanks")?,
            tank_readings: count("tank_readings")?,
            material_flows: count("material_flows")?,
            meters: count(self.meter_schema.table.as_str())?,
            meter_readings: count("meter_readings")?,
            latest_tank_reading: latest("tank_readings")?,
            latest_meter_reading: latest("meter_readings")?,
        })
    }
}

fn upsert_materials(tx: &Transaction<'_>, materials: &[MaterialMeta]) -> Result<usize, DbError> {
    let mut stmt = tx.prepare(
        "
        INSERT INTO materials (id, name, density, concentration)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            density = excluded.density,
            concentration = excluded.concentration
        ",
    )?;
    let mut written = 0;
    for material in materials {
        written += stmt.execute(params![
            material.id.get(),
            material.name,
            material.density,
            material.concentration,
        ])?;
    }
    Ok(written)
}

fn upsert_tanks(tx: &Transaction<'_>, tanks: &[TankRecord]) -> Result<usize, DbError> {
    let mut stmt = tx.prepare(
        "
        INSERT INTO tanks (tank_id, tank_name, material_id, capacity, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(tank_id) DO UPDATE SET
            tank_name = excluded.tank_name,
            material_id = excluded.material_id,
            capacity = excluded.capacity,
            updated_at = excluded.updated_at
        ",
    )?;
    let mut written = 0;
    for tank in tanks {
        written += stmt.execute(params![
            tank.id.get(),
            tank.name,
            tank.material_id.get(),
            tank.capacity,
            format_timestamp(tank.updated_at),
        ])?;
    }
    Ok(written)
}

fn upsert_meters(
    tx: &Transaction<'_>,
    schema: &MeterSchema,
    meters: &[MeterRecord],
) -> Result<usize, DbError> {
    if meters.is_empty() {
        return Ok(0);
    }
    let mut columns = vec![schema.id_column, "name"];
    if schema.has_unit {
        columns.push("unit");
    }
    if schema.has_multiplier {
        columns.push("multiplier");
    }
    let sql = format!(
        "INSERT OR REPLACE INTO {table} ({columns}) VALUES ({values})",
        table = schema.table.as_str(),
        columns = columns.join(", "),
        values = placeholders(columns.len()),
    );
    let mut stmt = tx.prepare(&sql)?;
    let mut written = 0;
    for meter in meters {
        let mut values: Vec<rusqlite::types::Value> =
            vec![meter.id.get().into(), meter.name.clone().into()];
        if schema.has_unit {
            values.push(meter.unit.clone().into());
        }
        if schema.has_multiplier {
            values.push(meter.multiplier.into());
        }
        written += stmt.execute(params_from_iter(values))?;
    }
    Ok(written)
}

fn insert_tank_readings(tx: &Transaction<'_>, readings: &[StockSnapshot]) -> Result<usize, DbError> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO tank_readings (tank_id, level_percent, recorded_at) VALUES (?, ?, ?)",
    )?;
    let mut inserted = 0;
    for reading in readings {
        inserted += stmt.execute(params![
            reading.vessel_id.get(),
            reading.level_percent,
            format_timestamp(reading.recorded_at),
        ])?;
    }
    Ok(inserted)
}

fn insert_flows(tx: &Transaction<'_>, flows: &[FlowEntry]) -> Result<usize, DbError> {
    let mut stmt = tx.prepare(
        "
        INSERT OR IGNORE INTO material_flows (material_id, amount, unit, flow_type, occurred_at)
        VALUES (?, ?, ?, ?, ?)
        ",
    )?;
    let mut inserted = 0;
    for flow in flows {
        inserted += stmt.execute(params![
            flow.material_id.get(),
            flow.amount,
            flow.unit,
            flow.flow_type,
            format_timestamp(flow.occurred_at),
        ])?;
    }
    Ok(inserted)
}

fn insert_meter_readings(
    tx: &Transaction<'_>,
    readings: &[CounterReading],
) -> Result<usize, DbError> {
    let mut stmt = tx.prepare(
        "
        INSERT OR IGNORE INTO meter_readings (meter_id, reading_value, is_reset, recorded_at)
        VALUES (?, ?, ?, ?)
        ",
    )?;
    let mut inserted = 0;
    for reading in readings {
        inserted += stmt.execute(params![
            reading.meter_id.get(),
            reading.value,
            reading.is_reset,
            format_timestamp(reading.recorded_at),
        ])?;
    }
    Ok(inserted)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, DbError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn column_names(conn: &Connection, table: &str) -> Result<HashSet<String>, DbError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }
    Ok(columns)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn parse_timestamp(table: &'static str, timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            timestamp: timestamp.to_string(),
            source,
        })
}

/// Formats a timestamp the way every stored timestamp is written.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use plant_core::{BalanceKind, FlowKind};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, day, hour, 0, 0).unwrap()
    }

    fn tank(id: i64, material: i64, capacity: f64) -> TankRecord {
        TankRecord {
            id: VesselId::new(id),
            name: format!("{id}#罐"),
            material_id: MaterialId::new(material),
            capacity,
            updated_at: at(1, 0),
        }
    }

    fn level(tank: i64, instant: DateTime<Utc>, percent: f64) -> StockSnapshot {
        StockSnapshot {
            vessel_id: VesselId::new(tank),
            level_percent: percent,
            recorded_at: instant,
        }
    }

    fn counter(meter: i64, instant: DateTime<Utc>, value: f64) -> CounterReading {
        CounterReading {
            meter_id: MeterId::new(meter),
            value,
            is_reset: false,
            recorded_at: instant,
        }
    }

    fn meter(id: i64, name: &str, unit: Option<&str>) -> MeterRecord {
        MeterRecord {
            id: MeterId::new(id),
            name: name.to_string(),
            unit: unit.map(str::to_string),
            multiplier: None,
        }
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "tanks"),
            vec!["tank_id", "tank_name", "material_id", "capacity", "updated_at"]
        );
        assert_eq!(
            table_columns(&db.conn, "tank_readings"),
            vec!["tank_id", "level_percent", "recorded_at"]
        );
        assert_eq!(
            table_columns(&db.conn, "material_flows"),
            vec!["material_id", "amount", "unit", "flow_type", "occurred_at"]
        );
        assert_eq!(table_columns(&db.conn, "meters"), vec!["id", "name", "unit", "multiplier"]);
        assert_eq!(
            table_columns(&db.conn, "meter_readings"),
            vec!["meter_id", "reading_value", "is_reset", "recorded_at"]
        );
        assert_eq!(
            *db.meter_schema(),
            MeterSchema {
                table: MeterTable::Meters,
                id_column: "id",
                has_multiplier: true,
                has_unit: true,
            }
        );
    }

    #[test]
    fn insert_batch_is_idempotent() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let batch = RecordBatch {
            tanks: vec![tank(1, 4, 100.0)],
            tank_readings: vec![level(1, at(10, 0), 50.0)],
            flows: vec![FlowEntry {
                material_id: MaterialId::new(4),
                amount: 10.0,
                unit: "吨".to_string(),
                flow_type: "采购入库".to_string(),
                occurred_at: at(10, 4),
            }],
            ..RecordBatch::default()
        };

        let first = db.insert_batch(&batch).unwrap();
        assert_eq!(first.tank_readings, 1);
        assert_eq!(first.flows, 1);

        let second = db.insert_batch(&batch).unwrap();
        assert_eq!(second.tank_readings, 0);
        assert_eq!(second.flows, 0);
        assert_eq!(db.status().unwrap().material_flows, 1);
    }

    #[test]
    fn load_ledger_seeds_as_of_reading_and_computes_consumption() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.insert_batch(&RecordBatch {
            materials: vec![MaterialMeta {
                id: MaterialId::new(4),
                name: "双氧水".to_string(),
                density: Some(1.2),
                concentration: None,
            }],
            tanks: vec![tank(1, 4, 100.0), tank(2, 1, 100.0)],
            tank_readings: vec![
                level(1, at(8, 0), 70.0),
                level(1, at(9, 12), 50.0),
                level(1, at(10, 0), 40.0),
                level(1, at(11, 0), 30.0),
                level(1, at(12, 0), 10.0),
                level(2, at(10, 0), 99.0),
            ],
            flows: vec![
                FlowEntry {
                    material_id: MaterialId::new(4),
                    amount: 10.0,
                    unit: "吨".to_string(),
                    flow_type: "采购入库".to_string(),
                    occurred_at: at(10, 4),
                },
                FlowEntry {
                    material_id: MaterialId::new(4),
                    amount: 5.0,
                    unit: "立方米".to_string(),
                    flow_type: "采购入库".to_string(),
                    occurred_at: at(11, 0),
                },
            ],
            ..RecordBatch::default()
        })
        .unwrap();

        let start = at(10, 0) - Duration::hours(8);
        let end = at(11, 0);
        let ledger = db.load_ledger(&[MaterialId::new(4)], start, end).unwrap();

        let snapshots = ledger.snapshots(VesselId::new(1));
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].recorded_at, at(9, 12));
        assert_eq!(ledger.vessels_for(MaterialId::new(1)).count(), 0);
        assert_eq!(ledger.flows(MaterialId::new(4)).len(), 1);
        assert!((ledger.stock_at(MaterialId::new(4), start) - 50.0).abs() < 1e-9);

        let consumption = ledger.delta(MaterialId::new(4), start, end, BalanceKind::Consumption);
        assert!((consumption - 30.0).abs() < 1e-9);
    }

    #[test]
    fn load_ledger_classifies_free_text_flows() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let flow = |amount: f64, unit: &str, flow_type: &str, hour: u32| FlowEntry {
            material_id: MaterialId::new(1),
            amount,
            unit: unit.to_string(),
            flow_type: flow_type.to_string(),
            occurred_at: at(10, hour),
        };
        db.insert_batch(&RecordBatch {
            flows: vec![
                flow(3.0, "kg", "采购入库", 1),
                flow(4.0, " 立方米 ", "销售出库", 2),
                flow(5.0, "吨", "生产领料", 3),
            ],
            ..RecordBatch::default()
        })
        .unwrap();

        let ledger = db.load_ledger(&[MaterialId::new(1)], at(10, 0), at(11, 0)).unwrap();
        let classified: Vec<_> = ledger
            .flows(MaterialId::new(1))
            .iter()
            .map(|record| (record.unit, record.kind))
            .collect();
        assert_eq!(
            classified,
            vec![
                (UnitKind::Unknown, FlowKind::InboundPurchase),
                (UnitKind::Volume, FlowKind::OutboundSale),
                (UnitKind::Mass, FlowKind::Other),
            ]
        );
        // Unknown units count as mass
        let inbound = ledger.flow_in_sum(MaterialId::new(1), at(10, 0), at(11, 0));
        assert!((inbound - 3.0).abs() < 1e-9);
    }

    #[test]
    fn tank_history_queries() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(db.earliest_tank_reading().unwrap(), None);

        db.insert_batch(&RecordBatch {
            tanks: vec![tank(2, 1, 50.0), tank(1, 1, 100.0)],
            tank_readings: vec![level(1, at(10, 9), 20.0), level(2, at(10, 8), 40.0), level(1, at(10, 10), 30.0)],
            ..RecordBatch::default()
        })
        .unwrap();

        assert_eq!(db.earliest_tank_reading().unwrap(), Some(at(10, 8)));
        let names: Vec<String> = db.tank_basics().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["1#罐", "2#罐"]);

        let readings = db.tank_readings_between(at(10, 8), at(10, 9)).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].vessel_id, VesselId::new(2));
    }

    #[test]
    fn tank_levels_use_latest_reading_or_tank_update_time() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.insert_batch(&RecordBatch {
            materials: vec![MaterialMeta {
                id: MaterialId::new(1),
                name: "98酸".to_string(),
                density: None,
                concentration: Some(98.0),
            }],
            tanks: vec![tank(1, 1, 100.0), tank(2, 3, 80.0)],
            tank_readings: vec![level(1, at(10, 0), 20.0), level(1, at(11, 0), 35.0)],
            ..RecordBatch::default()
        })
        .unwrap();

        let levels = db.tank_levels().unwrap();
        assert_eq!(levels.len(), 2);
        assert!((levels[0].level_percent - 35.0).abs() < 1e-9);
        assert_eq!(levels[0].updated_at, at(11, 0));
        assert_eq!(levels[0].material_name.as_deref(), Some("98酸"));
        assert!(levels[1].level_percent.abs() < f64::EPSILON);
        assert_eq!(levels[1].updated_at, at(1, 0));
        assert_eq!(levels[1].material_name, None);
    }

    #[test]
    fn meter_series_filter_by_name_and_trimmed_unit() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.insert_batch(&RecordBatch {
            meters: vec![
                MeterRecord {
                    multiplier: Some(80.0),
                    ..meter(1, "1#变压器", Some("kWh"))
                },
                meter(2, "自来水", Some(" 立方米 ")),
                meter(3, "井水", Some("m3")),
            ],
            meter_readings: vec![
                counter(1, at(9, 23), 10.0),
                counter(1, at(10, 23), 12.0),
                counter(2, at(10, 23), 5.0),
                counter(3, at(20, 0), 7.0),
            ],
            ..RecordBatch::default()
        })
        .unwrap();

        let electric = db
            .meter_series_by_names(&["1#变压器".to_string()], at(1, 0), at(15, 0))
            .unwrap();
        assert_eq!(electric.len(), 1);
        assert_eq!(electric[0].multiplier, Some(80.0));
        assert_eq!(electric[0].readings.len(), 2);

        let units = vec!["立方米".to_string(), "m3".to_string()];
        let water = db.meter_series_by_units(&units, at(1, 0), at(15, 0)).unwrap();
        let names: Vec<&str> = water.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["自来水", "井水"]);
        assert_eq!(water[1].readings.len(), 0);
    }

    #[test]
    fn legacy_meter_table_is_detected_once() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("plant.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE utility_meters (meter_id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
                .unwrap();
        }

        let mut db = Database::open(&path).unwrap();
        assert_eq!(
            *db.meter_schema(),
            MeterSchema {
                table: MeterTable::UtilityMeters,
                id_column: "meter_id",
                has_multiplier: false,
                has_unit: false,
            }
        );
        assert!(!table_exists(&db.conn, "meters").unwrap());

        db.insert_batch(&RecordBatch {
            meters: vec![meter(7, "1#电炉", Some("kWh"))],
            meter_readings: vec![counter(7, at(10, 1), 1.0)],
            ..RecordBatch::default()
        })
        .unwrap();
        let series = db.meter_series_by_names(&["1#电炉".to_string()], at(1, 0), at(15, 0)).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].multiplier, None);

        let err = db
            .meter_series_by_units(&["m3".to_string()], at(1, 0), at(15, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::MissingColumn {
                table: "utility_meters",
                column: "unit"
            }
        ));
    }

    #[test]
    fn status_counts_rows() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.insert_batch(&RecordBatch {
            tanks: vec![tank(1, 1, 10.0)],
            tank_readings: vec![level(1, at(10, 0), 1.0), level(1, at(11, 0), 2.0)],
            meters: vec![meter(1, "m", None)],
            ..RecordBatch::default()
        })
        .unwrap();

        let status = db.status().unwrap();
        assert_eq!(status.tanks, 1);
        assert_eq!(status.tank_readings, 2);
        assert_eq!(status.meters, 1);
        assert_eq!(status.meter_readings, 0);
        assert_eq!(status.latest_tank_reading.as_deref(), Some("2024-02-11T00:00:00.000Z"));
        assert_eq!(status.latest_meter_reading, None);
    }

    #[test]
    fn corrupt_timestamps_surface_as_errors() {
        let db = Database::open_in_memory().expect("open in-memory db");
        db.conn
            .execute(
                "INSERT INTO tank_readings (tank_id, level_percent, recorded_at) VALUES (1, 5.0, 'yesterday')",
                [],
            )
            .unwrap();
        let err = db.earliest_tank_reading().unwrap_err();
        assert!(matches!(err, DbError::TimestampParse { table: "tank_readings", .. }));
    }
}
