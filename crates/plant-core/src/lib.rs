//! Derivation core for plant operations figures.
//!
//! This crate turns raw plant records into reporting series:
//! - Stock balances: as-of tank stock, classified flows, daily consumption
//!   and production over operational-day windows
//! - Utility meters: reset-aware daily usage and signed site totals
//! - Tank levels: fixed-width resampled history and current inventory
//!
//! Everything here is pure; records are loaded by the caller into a
//! [`Ledger`] or passed in as slices.

mod balance;
pub mod calendar;
pub mod config;
pub mod counter;
mod flow;
pub mod inventory;
mod ledger;
pub mod net;
pub mod number;
pub mod records;
pub mod resample;
pub mod series;
mod stock;
mod types;
pub mod units;

pub use balance::{BalanceKind, round2};
pub use calendar::{OperationalCalendar, OperationalWindow, PlantZone};
pub use config::{LevelHistoryDefaults, MaterialGrade, PlantConfig, ProductionMaterials};
pub use counter::{DailyUsage, daily_usage};
pub use inventory::{TankCategory, TankLevel, TankSummary, group_by_material};
pub use ledger::{Ledger, LedgerBuilder};
pub use net::{MeterWeight, MeterWeights, MissingMeterPolicy, NetUsageAggregator, NetUsagePoint};
pub use records::{CounterReading, FlowRecord, MaterialMeta, MeterSeries, StockSnapshot, Vessel};
pub use resample::{
    LevelHistory, LevelHistoryRequest, LevelHistoryWindow, ResampledBucket, TankBasic, resample,
};
pub use series::{DailyConsumptionPoint, DailyProductionPoint, DailySeriesBuilder};
pub use stock::level_as_of;
pub use types::{CoreError, MaterialId, MeterId, VesselId};
pub use units::{FlowKind, UnitKind};
