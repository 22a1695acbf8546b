//! In-memory view of the raw records needed for one request.
//!
//! A [`Ledger`] is loaded once per request from the store and then shared
//! read-only across worker threads, so every day in a series is computed from
//! the same consistent read.

use std::collections::HashMap;

use crate::records::{FlowRecord, MaterialMeta, StockSnapshot, Vessel};
use crate::types::{MaterialId, VesselId};

/// Immutable, time-indexed records for stock and flow lookups.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    vessels: Vec<Vessel>,
    /// Per-vessel snapshots, ascending by `recorded_at`.
    snapshots: HashMap<VesselId, Vec<StockSnapshot>>,
    /// Per-material flows, ascending by `occurred_at`.
    flows: HashMap<MaterialId, Vec<FlowRecord>>,
    materials: HashMap<MaterialId, MaterialMeta>,
}

impl Ledger {
    /// Starts an empty builder.
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::default()
    }

    /// Vessels assigned to `material_id`.
    pub fn vessels_for(&self, material_id: MaterialId) -> impl Iterator<Item = &Vessel> {
        self.vessels
            .iter()
            .filter(move |vessel| vessel.material_id == material_id)
    }

    /// Snapshots of one vessel in ascending time order.
    pub fn snapshots(&self, vessel_id: VesselId) -> &[StockSnapshot] {
        self.snapshots.get(&vessel_id).map_or(&[], Vec::as_slice)
    }

    /// Flows of one material in ascending time order.
    pub fn flows(&self, material_id: MaterialId) -> &[FlowRecord] {
        self.flows.get(&material_id).map_or(&[], Vec::as_slice)
    }

    /// Reference data for a material, if known.
    pub fn material(&self, material_id: MaterialId) -> Option<&MaterialMeta> {
        self.materials.get(&material_id)
    }
}

/// Accumulates records in any order and sorts them on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct LedgerBuilder {
    ledger: Ledger,
}

impl LedgerBuilder {
    #[must_use]
    pub fn vessel(mut self, vessel: Vessel) -> Self {
        self.ledger.vessels.push(vessel);
        self
    }

    #[must_use]
    pub fn material(mut self, meta: MaterialMeta) -> Self {
        self.ledger.materials.insert(meta.id, meta);
        self
    }

    #[must_use]
    pub fn snapshot(mut self, snapshot: StockSnapshot) -> Self {
        self.ledger
            .snapshots
            .entry(snapshot.vessel_id)
            .or_default()
            .push(snapshot);
        self
    }

    #[must_use]
    pub fn snapshots(self, snapshots: impl IntoIterator<Item = StockSnapshot>) -> Self {
        snapshots.into_iter().fold(self, Self::snapshot)
    }

    #[must_use]
    pub fn flow(mut self, flow: FlowRecord) -> Self {
        self.ledger
            .flows
            .entry(flow.material_id)
            .or_default()
            .push(flow);
        self
    }

    #[must_use]
    pub fn flows(self, flows: impl IntoIterator<Item = FlowRecord>) -> Self {
        flows.into_iter().fold(self, Self::flow)
    }

    /// Sorts every series by timestamp. Equal timestamps keep insertion order.
    pub fn build(mut self) -> Ledger {
        for series in self.ledger.snapshots.values_mut() {
            series.sort_by_key(|snapshot| snapshot.recorded_at);
        }
        for series in self.ledger.flows.values_mut() {
            series.sort_by_key(|flow| flow.occurred_at);
        }
        self.ledger.vessels.sort_by_key(|vessel| vessel.id);
        self.ledger
    }
}
