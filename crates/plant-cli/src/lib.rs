//! Plant metrics CLI library.
//!
//! This crate provides the CLI interface over the derivation core and the
//! record store.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, DateRangeArgs, LevelHistoryArgs};
pub use config::Config;
