//! As-of stock resolution.

use chrono::{DateTime, Utc};

use crate::ledger::Ledger;
use crate::records::StockSnapshot;
use crate::types::MaterialId;

impl Ledger {
    /// Total stock of `material_id` at `instant`, in tons.
    ///
    /// Each vessel contributes `capacity * level / 100` using its latest
    /// snapshot recorded at or before `instant`; a vessel with no such snapshot
    /// contributes nothing. Snapshots after `instant` are never consulted.
    pub fn stock_at(&self, material_id: MaterialId, instant: DateTime<Utc>) -> f64 {
        self.vessels_for(material_id)
            .map(|vessel| {
                let level = level_as_of(self.snapshots(vessel.id), instant).unwrap_or(0.0);
                vessel.capacity * level / 100.0
            })
            .sum()
    }
}

/// Level of the latest snapshot at or before `instant`.
///
/// `snapshots` must be sorted ascending by `recorded_at`.
pub fn level_as_of(snapshots: &[StockSnapshot], instant: DateTime<Utc>) -> Option<f64> {
    let idx = snapshots.partition_point(|snapshot| snapshot.recorded_at <= instant);
    idx.checked_sub(1).map(|i| snapshots[i].level_percent)
}
