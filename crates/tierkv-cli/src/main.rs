//! CLI entry point for tierkv.
//!
//! Opens the store the configuration describes, waits for tier selection
//! to finish, runs one subcommand against the facade, then flushes any
//! queued writes before exiting.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tierkv_store::{BackendKind, PersistOp, StorageFacade, StoreConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Written by `tierkv setup` when no configuration file exists.
const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Setup | Commands::Status => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    let mut config = StoreConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?
        .with_env_overrides();
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    if let Commands::Setup = cli.command {
        return cmd_setup(&cli.config, &config);
    }

    let store = StorageFacade::open(&config);
    let backend = store.when_ready().await;
    info!(backend = %backend, entries = store.len(), "store ready");

    match cli.command {
        Commands::Status => cmd_status(&store, &config, backend),
        Commands::Get { key } => match store.get(&key) {
            Some(value) => println!("{value}"),
            None => println!("(not set)"),
        },
        Commands::Set { key, value } => store.set(&key, value),
        Commands::Remove { key } => store.remove(&key),
        Commands::Clear => store.clear(),
        Commands::Dump { json } => cmd_dump(&store, json)?,
        Commands::Setup => {}
    }

    store.flush().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: setup
// ---------------------------------------------------------------------------

fn cmd_setup(config_path: &Path, config: &StoreConfig) -> Result<()> {
    println!();
    println!("  tierkv Setup");
    println!("  ============");
    println!();

    if config.data_dir.exists() {
        println!("  [=] Data directory already exists");
    } else {
        std::fs::create_dir_all(&config.data_dir).context("failed to create data directory")?;
        println!("  [+] Created data directory {}", config.data_dir.display());
    }

    if config_path.exists() {
        println!("  [=] Config already exists at {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        std::fs::write(config_path, DEFAULT_CONFIG).context("failed to write config")?;
        println!("  [+] Wrote default config to {}", config_path.display());
    }

    println!();
    println!("  Setup complete! Run `tierkv status` to see which backend is selected.");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

fn cmd_status(store: &StorageFacade, config: &StoreConfig, backend: BackendKind) {
    let diag = store.diagnostics();

    println!();
    println!("  tierkv Status");
    println!("  =============");
    println!();
    println!("  Backend:          {backend}");
    if !backend.is_persistent() {
        println!("                    (nothing written this session will be kept)");
    }
    println!("  Entries:          {}", store.len());
    println!("  Data directory:   {}", config.data_dir.display());
    println!("  Unavailable:      {}", diag.unavailable());
    println!("  Load failures:    {}", diag.load_failures());
    println!("  Write failures:   {}", diag.persistence_failures(PersistOp::Write));
    println!("  Seed skipped:     {}", diag.malformed_entries());
    println!();
}

// ---------------------------------------------------------------------------
// Subcommand: dump
// ---------------------------------------------------------------------------

fn cmd_dump(store: &StorageFacade, json: bool) -> Result<()> {
    let entries: Vec<(String, String)> = store
        .keys()
        .into_iter()
        .filter_map(|key| store.get(&key).map(|value| (key, value)))
        .collect();

    if json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        let formatted = serde_json::to_string_pretty(&map).context("failed to encode entries")?;
        println!("{formatted}");
    } else {
        for (key, value) in entries {
            println!("{key}={value}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}
