//! Raw measurement and ledger records consumed by the derivation core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MaterialId, MeterId, VesselId};
use crate::units::{FlowKind, UnitKind};

/// A storage vessel and the material it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub id: VesselId,
    pub name: String,
    pub material_id: MaterialId,
    /// Full capacity in tons.
    pub capacity: f64,
}

/// A point-in-time level measurement of one vessel.
///
/// `level_percent` is nominally within \[0, 100\] but is not enforced; source
/// instruments occasionally report values outside that range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub vessel_id: VesselId,
    pub level_percent: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Static reference data for a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialMeta {
    pub id: MaterialId,
    pub name: String,
    /// Mass per unit volume (t/m³). `None` means 1.
    pub density: Option<f64>,
    /// Purity percentage.
    pub concentration: Option<f64>,
}

/// A material ledger entry, classified at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub material_id: MaterialId,
    pub amount: f64,
    pub unit: UnitKind,
    pub kind: FlowKind,
    pub occurred_at: DateTime<Utc>,
}

impl FlowRecord {
    /// Builds a record from the free-text columns of the source ledger.
    pub fn classify(
        material_id: MaterialId,
        amount: f64,
        unit: &str,
        flow_type: &str,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            material_id,
            amount,
            unit: UnitKind::classify(unit),
            kind: FlowKind::classify(flow_type),
            occurred_at,
        }
    }
}

/// A cumulative utility counter reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterReading {
    pub meter_id: MeterId,
    pub value: f64,
    /// Marks a meter replacement or rollover at this reading.
    pub is_reset: bool,
    pub recorded_at: DateTime<Utc>,
}

/// All readings of one meter, with its display name and scale factor.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSeries {
    pub meter_id: MeterId,
    pub name: String,
    /// Scale applied to raw counter deltas. `None` means 1.
    pub multiplier: Option<f64>,
    pub readings: Vec<CounterReading>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn flow_record_classifies_free_text_columns() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
        let record = FlowRecord::classify(MaterialId::new(4), 12.0, " 立方米", "采购入库", at);
        assert_eq!(record.unit, UnitKind::Volume);
        assert_eq!(record.kind, FlowKind::InboundPurchase);
        assert_eq!(record.occurred_at, at);
    }

    #[test]
    fn snapshot_serialization_roundtrip() {
        let snapshot = StockSnapshot {
            vessel_id: VesselId::new(3),
            level_percent: 55.5,
            recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: StockSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
