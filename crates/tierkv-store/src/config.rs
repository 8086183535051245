//! Storage configuration.
//!
//! [`StoreConfig`] is read from the `[storage]` table of
//! `config/default.toml`, then overridden by `TIERKV_*` environment
//! variables. Missing files or sections fall back to [`Default`], and a
//! builder-style API lets embedders and tests adjust single fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Default location of the configuration file, relative to the working dir.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Settings for tier selection and the native backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the sync-store file and the indexed-store database.
    ///
    /// Default: **`data`**.
    pub data_dir: PathBuf,

    /// Whether the synchronous file store may be probed at all.
    pub sync_store_enabled: bool,

    /// File stem of the sync store (`<data_dir>/<name>.json`).
    pub sync_store_name: String,

    /// Size limit of the serialized sync store, in bytes.
    ///
    /// Default: **5 MiB**.
    pub sync_store_quota_bytes: usize,

    /// Whether the SQLite store may be probed at all.
    pub indexed_store_enabled: bool,

    /// File stem of the indexed store (`<data_dir>/<name>.db`).
    pub indexed_db_name: String,

    /// Global names scanned, in order, for a host bridge.
    pub bridge_globals: Vec<String>,

    /// Keys read from a host bridge, which cannot enumerate its contents.
    pub well_known_keys: Vec<String>,

    /// When set, an environment-variable bridge is registered under
    /// [`ENV_BRIDGE_GLOBAL`](crate::environment::ENV_BRIDGE_GLOBAL) and reads
    /// `<prefix><KEY>`.
    pub bridge_env_prefix: Option<String>,

    /// Environment variable holding the `k=v; k2=v2` seed for the in-memory
    /// fallback.
    pub seed_env_var: String,

    /// Upper bound on probe plus load of one tier, in milliseconds. `0`
    /// disables the bound.
    pub probe_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sync_store_enabled: true,
            sync_store_name: "tierkv".into(),
            sync_store_quota_bytes: 5 * 1024 * 1024,
            indexed_store_enabled: true,
            indexed_db_name: "tierkv".into(),
            bridge_globals: vec![
                "HostStorage".into(),
                "NativeBridge".into(),
                "EnvBridge".into(),
            ],
            well_known_keys: vec![
                "rewards.missions".into(),
                "rewards.transactions".into(),
                "rewards.history".into(),
                "rewards.balance".into(),
                "rewards.settings".into(),
            ],
            bridge_env_prefix: None,
            seed_env_var: "TIERKV_COOKIE".into(),
            probe_timeout_ms: 5_000,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    storage: StoreConfig,
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the `[storage]` table from `path`.
    ///
    /// A missing file yields defaults; a file that fails to parse is an error.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_toml(&content)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse the `[storage]` table out of a TOML document.
    pub fn from_toml(content: &str) -> StoreResult<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        Ok(file.storage)
    }

    /// Apply `TIERKV_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `TIERKV_*` overrides from an arbitrary lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("TIERKV_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("TIERKV_SYNC_STORE").and_then(|v| parse_flag(&v)) {
            self.sync_store_enabled = flag;
        }
        if let Some(flag) = lookup("TIERKV_INDEXED_STORE").and_then(|v| parse_flag(&v)) {
            self.indexed_store_enabled = flag;
        }
        if let Some(ms) = lookup("TIERKV_PROBE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            self.probe_timeout_ms = ms;
        }
        if let Some(keys) = lookup("TIERKV_WELL_KNOWN_KEYS") {
            self.well_known_keys = split_list(&keys);
        }
        if let Some(prefix) = lookup("TIERKV_BRIDGE_ENV_PREFIX") {
            self.bridge_env_prefix = Some(prefix).filter(|p| !p.is_empty());
        }
        self
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Enable or disable the synchronous file store.
    pub fn with_sync_store(mut self, enabled: bool) -> Self {
        self.sync_store_enabled = enabled;
        self
    }

    /// Set the sync store size limit (in bytes).
    pub fn with_sync_store_quota(mut self, bytes: usize) -> Self {
        self.sync_store_quota_bytes = bytes;
        self
    }

    /// Enable or disable the SQLite store.
    pub fn with_indexed_store(mut self, enabled: bool) -> Self {
        self.indexed_store_enabled = enabled;
        self
    }

    /// Replace the host-bridge well-known key list.
    pub fn with_well_known_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.well_known_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Register an environment-variable bridge reading `<prefix><KEY>`.
    pub fn with_bridge_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bridge_env_prefix = Some(prefix.into());
        self
    }

    /// Set the per-tier timeout (in milliseconds, `0` disables it).
    pub fn with_probe_timeout_ms(mut self, ms: u64) -> Self {
        self.probe_timeout_ms = ms;
        self
    }

    /// Path of the synchronous file store.
    pub fn sync_store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.sync_store_name))
    }

    /// Path of the SQLite database.
    pub fn indexed_store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.indexed_db_name))
    }

    /// The per-tier timeout, or `None` when disabled.
    pub fn probe_timeout(&self) -> Option<Duration> {
        (self.probe_timeout_ms > 0).then(|| Duration::from_millis(self.probe_timeout_ms))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
