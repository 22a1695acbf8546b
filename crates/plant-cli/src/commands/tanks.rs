//! Current tank inventory.

use std::io::Write;

use anyhow::{Context, Result};

use plant_core::group_by_material;
use plant_db::Database;

use crate::commands::util::write_data;

pub fn run<W: Write>(writer: &mut W, db: &Database) -> Result<()> {
    let levels = db.tank_levels().context("failed to load tank levels")?;
    let categories = group_by_material(levels);
    tracing::info!(categories = categories.len(), "listed tank inventory");
    write_data(writer, &categories)
}
