//! Backend strategies.
//!
//! Each tier implements [`Backend`]: `probe` checks availability and hands
//! back a [`BackendHandle`], whose `load` bulk-reads every entry and binds
//! the three persistence operations. The
//! [`InitializationSequencer`](crate::InitializationSequencer) walks an
//! ordered `Vec<Box<dyn Backend>>` and stops at the first tier that gets
//! through both steps.

pub mod bridge;
pub mod indexed;
pub mod memory;
pub mod sync_store;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::diagnostics::Diagnostics;
use crate::error::{StoreResult, TierError};

pub use bridge::{BridgeBackend, EnvBridge, HostBridge, HostGlobals, HostValue, MapBridge};
pub use indexed::{IndexedBackend, IndexedLocation};
pub use memory::{MemoryBackend, parse_seed};
pub use sync_store::{FileStore, SyncStore, SyncStoreBackend};

// ---------------------------------------------------------------------------
// Backend tag
// ---------------------------------------------------------------------------

/// Which tier is serving the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Synchronous key/value store, probed first.
    SyncStore,
    /// SQLite database reached through the blocking pool.
    IndexedStore,
    /// Host-provided bridge object found among the environment globals.
    HostBridge,
    /// No persistence; the cache is all there is.
    InMemory,
}

impl BackendKind {
    /// The stable tag used in logs and by the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncStore => "primary-sync-store",
            Self::IndexedStore => "async-indexed-store",
            Self::HostBridge => "host-bridge-store",
            Self::InMemory => "in-memory",
        }
    }

    /// Whether data written under this tier survives the session.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::InMemory)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Persistence binding
// ---------------------------------------------------------------------------

/// The three mutations bound to the selected backend.
///
/// Implementations must not block on slow I/O: either the native call is
/// synchronous and cheap, or the work is dispatched and `Ok(())` means
/// "handed off".
pub trait Persistence: Send + Sync {
    fn write(&self, key: &str, value: &str) -> StoreResult<()>;

    fn delete(&self, key: &str) -> StoreResult<()>;

    fn clear(&self) -> StoreResult<()>;

    /// A receiver that fires once all work dispatched so far has finished.
    ///
    /// `None` means there is nothing in flight: every call already completed
    /// before returning.
    fn flush(&self) -> Option<oneshot::Receiver<()>> {
        None
    }
}

/// Binding used before initialization and by the in-memory tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
    fn write(&self, _key: &str, _value: &str) -> StoreResult<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> StoreResult<()> {
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Result of a successful bulk load.
pub struct LoadedCache {
    /// Every entry found in the backend.
    pub entries: HashMap<String, String>,
    /// Mutations targeting the same backend.
    pub binding: Arc<dyn Persistence>,
}

impl fmt::Debug for LoadedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Strategy traits
// ---------------------------------------------------------------------------

/// One candidate tier.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The tag this tier reports once selected.
    fn kind(&self) -> BackendKind;

    /// Check availability without touching the cache.
    ///
    /// Unavailability is reported as [`TierError::ProbeUnavailable`] and is
    /// never fatal.
    async fn probe(&self) -> Result<Box<dyn BackendHandle>, TierError>;
}

/// A tier that passed its probe and is ready to be loaded.
#[async_trait]
pub trait BackendHandle: Send {
    /// Enumerate every persisted entry and bind persistence.
    ///
    /// `diagnostics` receives failures of work the binding dispatches in
    /// the background.
    async fn load(self: Box<Self>, diagnostics: Arc<Diagnostics>)
    -> Result<LoadedCache, TierError>;
}
