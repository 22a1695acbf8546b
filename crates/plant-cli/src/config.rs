//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use plant_core::PlantConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Operational constants for the derivations.
    #[serde(default)]
    pub plant: PlantConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            plant: PlantConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Only `database_path` is seeded as a provider default. The `[plant]`
    /// table falls back to [`PlantConfig::default`] field by field, so a
    /// configured meter list replaces the default list instead of merging
    /// into it.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::default("database_path", default_database_path()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PLANT_*, nested with `__`)
        figment = figment.merge(Env::prefixed("PLANT_").split("__"));

        figment.extract()
    }
}

fn default_database_path() -> PathBuf {
    dirs_data_path()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plant.db")
}

/// Returns the platform-specific config directory for plant.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("plant"))
}

/// Returns the platform-specific data directory for plant.
///
/// On Linux: `~/.local/share/plant`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("plant"))
}
