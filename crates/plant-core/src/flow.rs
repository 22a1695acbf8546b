//! Flow accumulation over half-open time windows.

use chrono::{DateTime, Utc};

use crate::ledger::Ledger;
use crate::types::MaterialId;
use crate::units::FlowKind;

impl Ledger {
    /// Sum of `kind` flows of `material_id` within `[start, end)`, in tons.
    ///
    /// Volume amounts are converted with the material density.
    pub fn flow_sum(
        &self,
        material_id: MaterialId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: FlowKind,
    ) -> f64 {
        if end <= start {
            return 0.0;
        }
        let density = self.material(material_id).and_then(|meta| meta.density);
        let flows = self.flows(material_id);
        let from = flows.partition_point(|flow| flow.occurred_at < start);
        let to = flows.partition_point(|flow| flow.occurred_at < end);

        flows[from..to]
            .iter()
            .filter(|flow| flow.kind == kind)
            .map(|flow| flow.unit.to_mass(flow.amount, density))
            .sum()
    }

    /// Purchase receipts of `material_id` within `[start, end)`.
    pub fn flow_in_sum(&self, material_id: MaterialId, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        self.flow_sum(material_id, start, end, FlowKind::InboundPurchase)
    }

    /// Sales shipments of `material_id` within `[start, end)`.
    pub fn flow_out_sum(&self, material_id: MaterialId, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        self.flow_sum(material_id, start, end, FlowKind::OutboundSale)
    }
}
