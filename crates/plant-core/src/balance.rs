//! Material-balance deltas over a single window.
//!
//! Consumption: `stock(start) - stock(end) + purchases`. Stock that left the
//! vessels without a matching shipment is counted as consumed; purchases are
//! added back because they raise the ending stock.
//!
//! Production: `stock(end) - stock(start) + sales`.
//!
//! Neither figure is clamped at zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::types::MaterialId;

/// Direction of the balance identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceKind {
    Consumption,
    Production,
}

impl Ledger {
    /// Balance delta of `material_id` over `[start, end)` at full precision.
    pub fn delta(
        &self,
        material_id: MaterialId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: BalanceKind,
    ) -> f64 {
        let start_stock = self.stock_at(material_id, start);
        let end_stock = self.stock_at(material_id, end);
        match kind {
            BalanceKind::Consumption => {
                start_stock - end_stock + self.flow_in_sum(material_id, start, end)
            }
            BalanceKind::Production => {
                end_stock - start_stock + self.flow_out_sum(material_id, start, end)
            }
        }
    }
}

/// Rounds to two decimals for presentation. Negative zero becomes zero.
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}
