//! Canonical unit and flow-type classification.
//!
//! Flow records arrive with free-text `unit` and `flow_type` columns. They are
//! classified exactly once, when the record enters a [`Ledger`](crate::Ledger),
//! and every later computation works on [`UnitKind`] and [`FlowKind`] only.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unit strings that denote mass (metric tons).
const MASS_UNITS: &[&str] = &["吨", "t", "T", "ton", "tons"];

/// Unit strings that denote volume (cubic meters).
const VOLUME_UNITS: &[&str] = &["立方米", "m3", "M3", "m³"];

/// Canonical marker for purchase receipts.
const INBOUND_PURCHASE_MARKER: &str = "采购入库";

/// Canonical marker for sales shipments.
const OUTBOUND_SALE_MARKER: &str = "销售出库";

/// Physical dimension of a flow amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Already a mass; passes through unchanged.
    Mass,
    /// A volume; converted to mass with the material density.
    Volume,
    /// Unrecognized unit; passes through unchanged.
    Unknown,
}

impl UnitKind {
    /// Classifies a declared unit string.
    ///
    /// Mass markers win over volume markers, so `吨` is never read as a volume.
    pub fn classify(unit: &str) -> Self {
        let unit = unit.trim();
        if MASS_UNITS.contains(&unit) || unit.contains('吨') {
            Self::Mass
        } else if VOLUME_UNITS.contains(&unit) || unit.contains('方') || unit.contains('米') {
            Self::Volume
        } else {
            Self::Unknown
        }
    }

    /// String representation, as logged when flows are loaded.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mass => "mass",
            Self::Volume => "volume",
            Self::Unknown => "unknown",
        }
    }

    /// Converts `amount` to mass. A missing density counts as 1.
    pub fn to_mass(self, amount: f64, density: Option<f64>) -> f64 {
        match self {
            Self::Mass | Self::Unknown => amount,
            Self::Volume => amount * density.unwrap_or(1.0),
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Business category of a material flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Goods received from a supplier.
    InboundPurchase,
    /// Goods shipped to a customer.
    OutboundSale,
    /// Anything else (transfers, adjustments, returns).
    Other,
}

impl FlowKind {
    /// Classifies a declared flow type: exact match or case-insensitive substring.
    pub fn classify(flow_type: &str) -> Self {
        let lowered = flow_type.to_lowercase();
        if flow_type == INBOUND_PURCHASE_MARKER || lowered.contains(INBOUND_PURCHASE_MARKER) {
            Self::InboundPurchase
        } else if flow_type == OUTBOUND_SALE_MARKER || lowered.contains(OUTBOUND_SALE_MARKER) {
            Self::OutboundSale
        } else {
            Self::Other
        }
    }

    /// String representation, as logged when flows are loaded.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InboundPurchase => "inbound_purchase",
            Self::OutboundSale => "outbound_sale",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
