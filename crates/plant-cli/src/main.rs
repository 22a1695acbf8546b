use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use plant_cli::commands::{consumption, import, level_history, meters, production, status, tanks};
use plant_cli::{Cli, Commands, Config};

/// Load and validate config, then open the database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(plant_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    config
        .plant
        .validate()
        .context("invalid plant configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = plant_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support; stdout carries the JSON output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Consumption(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            consumption::run(&mut stdout, &db, &config.plant, args)?;
        }
        Some(Commands::Production(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            production::run(&mut stdout, &db, &config.plant, args)?;
        }
        Some(Commands::Electric(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            meters::electric(&mut stdout, &db, &config.plant, args)?;
        }
        Some(Commands::Water(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            meters::water(&mut stdout, &db, &config.plant, args)?;
        }
        Some(Commands::LevelHistory(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            level_history::run(&mut stdout, &db, &config.plant, args)?;
        }
        Some(Commands::Tanks) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            tanks::run(&mut stdout, &db)?;
        }
        Some(Commands::Import) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            import::run(io::stdin().lock(), &mut io::stderr(), &mut db)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
