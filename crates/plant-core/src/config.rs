//! Business configuration for the derivation core.
//!
//! All plant-specific constants live here and are injected by the
//! composition root; nothing in the algorithms is hardcoded.

use std::collections::BTreeMap;

use chrono::FixedOffset;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::{OperationalCalendar, PlantZone};
use crate::net::{MeterWeight, MeterWeights, MissingMeterPolicy};
use crate::types::{CoreError, MaterialId};

/// A material and the purity used for equivalence weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialGrade {
    pub material_id: MaterialId,
    /// Purity in percent, e.g. 98 or 105.
    pub concentration: f64,
}

/// The three acid products that make up the production series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductionMaterials {
    /// The reference product; other grades are expressed in its equivalent.
    pub acid98: MaterialGrade,
    pub fuming_acid: MaterialGrade,
    pub reagent_acid: MaterialGrade,
}

impl Default for ProductionMaterials {
    fn default() -> Self {
        Self {
            acid98: MaterialGrade {
                material_id: MaterialId::new(1),
                concentration: 98.0,
            },
            fuming_acid: MaterialGrade {
                material_id: MaterialId::new(2),
                concentration: 105.0,
            },
            reagent_acid: MaterialGrade {
                material_id: MaterialId::new(3),
                concentration: 93.0,
            },
        }
    }
}

/// Defaults for tank level history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelHistoryDefaults {
    pub hours: i64,
    pub bucket_minutes: i64,
    /// Upper bound on the computed bucket limit.
    pub max_limit: usize,
}

impl Default for LevelHistoryDefaults {
    fn default() -> Self {
        Self {
            hours: 24,
            bucket_minutes: 60,
            max_limit: 300_000,
        }
    }
}

/// Plant configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    /// Local hour at which an operational day starts.
    /// Default: 8.
    pub operational_day_start_hour: u32,

    /// Fixed plant UTC offset in minutes. Takes precedence over `time_zone`.
    pub utc_offset_minutes: Option<i32>,

    /// IANA time zone of the plant, e.g. `Asia/Shanghai`. With neither this
    /// nor `utc_offset_minutes` set, the host's local zone is used.
    pub time_zone: Option<String>,

    /// Material reported by the consumption series.
    /// Default: 4 (hydrogen peroxide).
    pub consumption_material_id: MaterialId,

    pub production: ProductionMaterials,

    /// Electric meters and their sign in the site total.
    pub electric_meters: BTreeMap<String, MeterWeight>,

    /// Meter units that identify water meters.
    pub water_units: Vec<String>,

    pub missing_meter_policy: MissingMeterPolicy,

    /// Worker threads for day fan-out. 0 uses the rayon default.
    pub max_parallel_days: usize,

    pub level_history: LevelHistoryDefaults,
}

impl Default for PlantConfig {
    fn default() -> Self {
        let include = ["1#变压器", "2#变压器", "1#电机", "2#电机", "1#电炉", "2#电炉", "丰联变压器"];
        let mut electric_meters: BTreeMap<String, MeterWeight> = include
            .into_iter()
            .map(|name| (name.to_string(), MeterWeight::Include))
            .collect();
        electric_meters.insert("安环部电表".to_string(), MeterWeight::Subtract);

        Self {
            operational_day_start_hour: 8,
            utc_offset_minutes: None,
            time_zone: None,
            consumption_material_id: MaterialId::new(4),
            production: ProductionMaterials::default(),
            electric_meters,
            water_units: ["立方米", "m3", "M3", "m³"].map(String::from).to_vec(),
            missing_meter_policy: MissingMeterPolicy::default(),
            max_parallel_days: 0,
            level_history: LevelHistoryDefaults::default(),
        }
    }
}

impl PlantConfig {
    /// Checks every value that would otherwise fail deep inside a computation.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.operational_day_start_hour > 23 {
            return Err(invalid(
                "operational_day_start_hour",
                format!("must be within 0..=23, got {}", self.operational_day_start_hour),
            ));
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if minutes.unsigned_abs() >= 24 * 60 {
                return Err(invalid(
                    "utc_offset_minutes",
                    format!("must be less than a day, got {minutes}"),
                ));
            }
        }
        self.zone()?;
        let grades = [
            ("production.acid98", self.production.acid98),
            ("production.fuming_acid", self.production.fuming_acid),
            ("production.reagent_acid", self.production.reagent_acid),
        ];
        for (field, grade) in grades {
            if !(grade.concentration.is_finite() && grade.concentration > 0.0) {
                return Err(invalid(
                    field,
                    format!("concentration must be positive, got {}", grade.concentration),
                ));
            }
        }
        if self.level_history.bucket_minutes <= 0 {
            return Err(invalid(
                "level_history.bucket_minutes",
                format!("must be positive, got {}", self.level_history.bucket_minutes),
            ));
        }
        if self.level_history.hours < 0 {
            return Err(invalid(
                "level_history.hours",
                format!("must not be negative, got {}", self.level_history.hours),
            ));
        }
        if self.level_history.max_limit == 0 {
            return Err(invalid("level_history.max_limit", "must be positive".to_string()));
        }
        Ok(())
    }

    /// Where local times are resolved: the fixed offset, then the named
    /// zone, then the host's zone.
    pub fn zone(&self) -> Result<PlantZone, CoreError> {
        if let Some(minutes) = self.utc_offset_minutes {
            return minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(PlantZone::Fixed)
                .ok_or_else(|| invalid("utc_offset_minutes", format!("out of range: {minutes}")));
        }
        match &self.time_zone {
            Some(name) => name
                .parse::<Tz>()
                .map(PlantZone::Named)
                .map_err(|_| invalid("time_zone", format!("unknown time zone {name:?}"))),
            None => Ok(PlantZone::HostLocal),
        }
    }

    pub fn calendar(&self) -> Result<OperationalCalendar, CoreError> {
        OperationalCalendar::new(self.zone()?, self.operational_day_start_hour)
    }

    /// Signed weights for the electric site total.
    pub fn electric_weights(&self) -> MeterWeights {
        MeterWeights::explicit(self.electric_meters.clone())
    }
}

fn invalid(field: &'static str, message: String) -> CoreError {
    CoreError::InvalidConfig { field, message }
}
