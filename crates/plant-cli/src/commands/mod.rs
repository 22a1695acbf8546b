//! CLI subcommand implementations.

pub mod consumption;
pub mod import;
pub mod level_history;
pub mod meters;
pub mod production;
pub mod status;
pub mod tanks;
pub mod util;
