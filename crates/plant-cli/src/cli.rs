//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Plant operations metrics.
///
/// Derives daily consumption, production and utility usage from tank level
/// readings, material ledgers and meter counters. Series are printed as JSON.
#[derive(Debug, Parser)]
#[command(name = "plant", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Daily consumption of the configured material.
    Consumption(DateRangeArgs),

    /// Daily production of the acid grades and their 98% equivalent.
    Production(DateRangeArgs),

    /// Daily net electricity usage across the configured meters.
    Electric(DateRangeArgs),

    /// Daily total water usage.
    Water(DateRangeArgs),

    /// Tank levels averaged into fixed-width time buckets.
    LevelHistory(LevelHistoryArgs),

    /// Current inventory of every tank, grouped by material.
    Tanks,

    /// Import JSONL records from stdin.
    Import,

    /// Show record counts and latest readings.
    Status,
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Args)]
pub struct DateRangeArgs {
    /// First date (YYYY-MM-DD).
    #[arg(long)]
    pub start: String,

    /// Last date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    pub end: String,
}

#[derive(Debug, Clone, Default, Args)]
pub struct LevelHistoryArgs {
    /// Hours of history before `--end`.
    #[arg(long, allow_negative_numbers = true)]
    pub hours: Option<i64>,

    /// Bucket width in minutes.
    #[arg(long, allow_negative_numbers = true)]
    pub bucket_minutes: Option<i64>,

    /// Maximum number of buckets.
    #[arg(long)]
    pub limit: Option<usize>,

    /// End of the range (RFC 3339 or e.g. "2 hours ago"). Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Start at the earliest recorded reading.
    #[arg(long)]
    pub all: bool,
}
