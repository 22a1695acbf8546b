//! Current tank inventory grouped by stored material.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::balance::round2;
use crate::calendar::format_instant;
use crate::number;
use crate::types::{MaterialId, VesselId};

/// A tank with its latest known level.
#[derive(Debug, Clone, PartialEq)]
pub struct TankLevel {
    pub tank_id: VesselId,
    pub tank_name: String,
    pub material_id: MaterialId,
    /// Material name, if the material is known.
    pub material_name: Option<String>,
    pub capacity: f64,
    /// 0 when the tank has never reported.
    pub level_percent: f64,
    /// Time of the latest reading, or of the last tank update without one.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TankSummary {
    pub id: VesselId,
    pub name: String,
    #[serde(serialize_with = "number::serialize")]
    pub total: f64,
    /// Tons currently held.
    #[serde(serialize_with = "number::serialize")]
    pub current: f64,
    #[serde(serialize_with = "number::serialize")]
    pub percentage: f64,
    pub updated_at: String,
}

/// All tanks holding one material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TankCategory {
    pub title: Option<String>,
    pub tanks: Vec<TankSummary>,
}

impl From<&TankLevel> for TankSummary {
    fn from(level: &TankLevel) -> Self {
        let current = if level.capacity > 0.0 {
            round2(level.capacity * level.level_percent / 100.0)
        } else {
            0.0
        };
        Self {
            id: level.tank_id,
            name: level.tank_name.clone(),
            total: level.capacity,
            current,
            percentage: level.level_percent,
            updated_at: format_instant(level.updated_at),
        }
    }
}

/// Groups tanks by material, ordered by material id then tank id.
pub fn group_by_material(mut levels: Vec<TankLevel>) -> Vec<TankCategory> {
    levels.sort_by_key(|level| (level.material_id, level.tank_id));

    let mut categories: Vec<(MaterialId, TankCategory)> = Vec::new();
    for level in &levels {
        let summary = TankSummary::from(level);
        match categories.last_mut() {
            Some((material, category)) if *material == level.material_id => category.tanks.push(summary),
            _ => categories.push((
                level.material_id,
                TankCategory {
                    title: level.material_name.clone(),
                    tanks: vec![summary],
                },
            )),
        }
    }
    categories.into_iter().map(|(_, category)| category).collect()
}
