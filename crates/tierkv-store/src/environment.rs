//! The ambient collaborators a session can find at startup.
//!
//! [`HostEnvironment`] is everything the tiers may probe: a synchronous
//! store, an indexed-store location, named host globals and a seed string.
//! It is usually built from [`StoreConfig`], but tests and embedders
//! assemble it directly to simulate any mix of available backends.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{EnvBridge, FileStore, HostBridge, HostGlobals, IndexedLocation, SyncStore};
use crate::config::StoreConfig;

/// Global name the environment-variable bridge is registered under.
pub const ENV_BRIDGE_GLOBAL: &str = "EnvBridge";

/// What the host offers; anything left `None` or empty probes as unavailable.
#[derive(Default, Clone)]
pub struct HostEnvironment {
    pub sync_store: Option<Arc<dyn SyncStore>>,
    pub indexed: Option<IndexedLocation>,
    pub globals: HostGlobals,
    pub seed: Option<String>,
}

impl HostEnvironment {
    /// An environment with no backends at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Discover the environment described by `config`.
    ///
    /// Creates the data directory if needed. A sync store that cannot be
    /// opened is left out, so its tier probes as unavailable.
    pub fn from_config(config: &StoreConfig) -> Self {
        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            debug!(dir = %config.data_dir.display(), error = %e, "data directory unavailable");
        }

        let sync_store = if config.sync_store_enabled {
            match FileStore::open(config.sync_store_path(), config.sync_store_quota_bytes) {
                Ok(store) => Some(Arc::new(store) as Arc<dyn SyncStore>),
                Err(e) => {
                    debug!(error = %e, "sync store could not be opened");
                    None
                }
            }
        } else {
            None
        };

        let indexed = config
            .indexed_store_enabled
            .then(|| IndexedLocation::File(config.indexed_store_path()));

        let mut globals = HostGlobals::new();
        if let Some(prefix) = &config.bridge_env_prefix {
            globals.insert_bridge(ENV_BRIDGE_GLOBAL, Arc::new(EnvBridge::new(prefix.clone())));
        }

        let seed = std::env::var(&config.seed_env_var).ok();

        Self {
            sync_store,
            indexed,
            globals,
            seed,
        }
    }

    pub fn with_sync_store(mut self, store: Arc<dyn SyncStore>) -> Self {
        self.sync_store = Some(store);
        self
    }

    pub fn with_indexed(mut self, location: IndexedLocation) -> Self {
        self.indexed = Some(location);
        self
    }

    /// Register `bridge` under the global `name`.
    pub fn with_bridge(mut self, name: impl Into<String>, bridge: Arc<dyn HostBridge>) -> Self {
        self.globals.insert_bridge(name, bridge);
        self
    }

    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = Some(seed.into());
        self
    }
}
