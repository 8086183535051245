//! # tierkv-store
//!
//! Tiered key-value storage with a synchronous read path.
//!
//! At startup the store probes its backends in priority order and binds
//! the first one that both probes and bulk-loads successfully. Every key is
//! cached in memory, so `get` never waits on I/O. Mutations update the
//! cache first and then go to the selected backend on a best-effort basis.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  StorageFacade   get / set / remove / clear  │
//! │  EntryCache      (dashmap, source of truth)  │
//! ├──────────────────────────────────────────────┤
//! │  InitializationSequencer                     │
//! │    1. SyncStoreBackend   (FileStore, JSON)   │
//! │    2. IndexedBackend     (rusqlite, WAL)     │
//! │    3. BridgeBackend      (host globals)      │
//! │    4. MemoryBackend      (cookie-style seed) │
//! ├──────────────────────────────────────────────┤
//! │  Diagnostics     (absorbed TierErrors)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A host bridge cannot enumerate its keys, so only the configured
//! `well_known_keys` are loaded from it. Other bridge keys are not visible
//! until they are written in this session.
//!
//! ## Quick start
//!
//! ```ignore
//! use tierkv_store::{StorageFacade, StoreConfig};
//!
//! let config = StoreConfig::load("config/default.toml")?.with_env_overrides();
//! let store = StorageFacade::open(&config);
//! let backend = store.when_ready().await;
//! store.set("rewards.balance", 120);
//! assert_eq!(store.get("rewards.balance").as_deref(), Some("120"));
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod facade;
pub mod migration;
pub mod sequencer;

// ── re-exports ───────────────────────────────────────────────────────

pub use backend::{
    Backend, BackendHandle, BackendKind, BridgeBackend, EnvBridge, FileStore, HostBridge,
    HostGlobals, HostValue, IndexedBackend, IndexedLocation, LoadedCache, MapBridge,
    MemoryBackend, NoopPersistence, Persistence, SyncStore, SyncStoreBackend, parse_seed,
};
pub use cache::{CacheStats, EntryCache};
pub use config::{DEFAULT_CONFIG_PATH, StoreConfig};
pub use db::Database;
pub use diagnostics::Diagnostics;
pub use environment::{ENV_BRIDGE_GLOBAL, HostEnvironment};
pub use error::{PersistOp, StoreError, StoreResult, TierError};
pub use facade::{ReadySignal, StorageFacade};
pub use sequencer::{InitializationSequencer, SequencerState};
