//! CLI argument definitions for tierkv.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tierkv -- tiered key-value store.
#[derive(Parser)]
#[command(
    name = "tierkv",
    version,
    about = "tierkv -- tiered key-value store",
    long_about = "Inspect and edit a tierkv store. The backend is chosen at startup: \
                  the sync file store, then SQLite, then a host bridge, then memory."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = tierkv_store::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the data directory from the configuration.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the selected backend, entry count and failure counters.
    Status,

    /// Create the data directory and a default configuration file.
    Setup,

    /// Print the value stored under a key.
    Get {
        /// The key to read.
        key: String,
    },

    /// Store a value under a key.
    Set {
        /// The key to write.
        key: String,
        /// The value to store.
        value: String,
    },

    /// Delete a key.
    Remove {
        /// The key to delete.
        key: String,
    },

    /// Delete every key.
    Clear,

    /// Print every loaded entry.
    Dump {
        /// Emit a JSON object instead of `key=value` lines.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_with_global_flags() {
        let cli = Cli::parse_from(["tierkv", "set", "k", "v", "--data-dir", "/tmp/kv"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/kv")));
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
        match cli.command {
            Commands::Set { key, value } => {
                assert_eq!(key, "k");
                assert_eq!(value, "v");
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn parses_dump_json() {
        let cli = Cli::parse_from(["tierkv", "-c", "other.toml", "dump", "--json"]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Commands::Dump { json: true }));
    }
}
