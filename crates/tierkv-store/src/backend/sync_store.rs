//! Tier 1: synchronous key/value store.
//!
//! [`SyncStore`] is the native contract: index-based key enumeration plus
//! get/set/remove/clear, all synchronous and all fallible. [`FileStore`] is
//! the bundled implementation, a JSON object on disk rewritten atomically
//! on every mutation and capped by a byte quota.
//!
//! Native calls are blocking, so the probe and the bulk load run on the
//! blocking pool, where the sequencer's timeout can still fire.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{Backend, BackendHandle, BackendKind, LoadedCache, Persistence};
use crate::diagnostics::Diagnostics;
use crate::error::{StoreError, StoreResult, TierError};

/// Sentinel key written and removed by the availability probe.
const PROBE_KEY: &str = "__tierkv_probe__";

// ---------------------------------------------------------------------------
// Native contract
// ---------------------------------------------------------------------------

/// A synchronous, string-keyed store.
pub trait SyncStore: Send + Sync {
    /// Number of stored entries.
    fn len(&self) -> StoreResult<usize>;

    /// The key at `index`, in the store's own iteration order.
    fn key(&self, index: usize) -> StoreResult<Option<String>>;

    fn get_item(&self, key: &str) -> StoreResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()>;

    fn remove_item(&self, key: &str) -> StoreResult<()>;

    fn clear(&self) -> StoreResult<()>;

    /// Every stored entry.
    ///
    /// The default walks `len`/`key`/`get_item`. Stores that can hand out
    /// a snapshot in one call should override it.
    fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for index in 0..self.len()? {
            let Some(key) = self.key(index)? else {
                continue;
            };
            if let Some(value) = self.get_item(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// JSON-file implementation of [`SyncStore`].
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    quota_bytes: usize,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, reading existing contents if the file exists.
    ///
    /// The file is not created until the first mutation.
    pub fn open(path: impl AsRef<Path>, quota_bytes: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), entries = entries.len(), "sync store opened");

        Ok(Self {
            path,
            quota_bytes,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))
    }

    /// Apply `f` to a copy of the entries, persist it, then commit in memory.
    ///
    /// A failed write leaves both the file and the in-memory view untouched.
    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> StoreResult<()> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        f(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let json = serde_json::to_string(entries)?;
        if json.len() > self.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                needed: json.len(),
                limit: self.quota_bytes,
            });
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SyncStore for FileStore {
    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    fn key(&self, index: usize) -> StoreResult<Option<String>> {
        Ok(self.lock()?.keys().nth(index).cloned())
    }

    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    #[instrument(skip(self, value))]
    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    #[instrument(skip(self))]
    fn remove_item(&self, key: &str) -> StoreResult<()> {
        if !self.lock()?.contains_key(key) {
            return Ok(());
        }
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    #[instrument(skip(self))]
    fn clear(&self) -> StoreResult<()> {
        self.mutate(BTreeMap::clear)
    }

    fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tier strategy
// ---------------------------------------------------------------------------

/// Strategy for the synchronous tier. Holds whatever store the environment
/// provides, if any.
pub struct SyncStoreBackend {
    store: Option<Arc<dyn SyncStore>>,
}

impl SyncStoreBackend {
    pub fn new(store: Option<Arc<dyn SyncStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Backend for SyncStoreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SyncStore
    }

    async fn probe(&self) -> Result<Box<dyn BackendHandle>, TierError> {
        let Some(store) = &self.store else {
            return Err(TierError::unavailable(
                BackendKind::SyncStore,
                "no synchronous store in this environment",
            ));
        };

        let store = Arc::clone(store);
        tokio::task::spawn_blocking(move || {
            store.set_item(PROBE_KEY, "1")?;
            store.remove_item(PROBE_KEY)?;
            Ok::<_, StoreError>(store)
        })
        .await
        .map_err(StoreError::from)
        .and_then(|result| result)
        .map(|store| Box::new(SyncStoreHandle { store }) as Box<dyn BackendHandle>)
        .map_err(|e| TierError::unavailable(BackendKind::SyncStore, e.to_string()))
    }
}

struct SyncStoreHandle {
    store: Arc<dyn SyncStore>,
}

fn enumerate(store: &dyn SyncStore) -> StoreResult<HashMap<String, String>> {
    Ok(store
        .entries()?
        .into_iter()
        .filter(|(key, _)| key != PROBE_KEY)
        .collect())
}

#[async_trait]
impl BackendHandle for SyncStoreHandle {
    async fn load(
        self: Box<Self>,
        _diagnostics: Arc<Diagnostics>,
    ) -> Result<LoadedCache, TierError> {
        let store = Arc::clone(&self.store);
        let entries = tokio::task::spawn_blocking(move || enumerate(store.as_ref()))
            .await
            .map_err(StoreError::from)
            .and_then(|result| result)
            .map_err(|source| TierError::LoadFailure {
                kind: BackendKind::SyncStore,
                source,
            })?;
        debug!(count = entries.len(), "sync store loaded");

        Ok(LoadedCache {
            entries,
            binding: Arc::new(SyncPersistence { store: self.store }),
        })
    }
}

/// Persistence calls go straight to the native store.
struct SyncPersistence {
    store: Arc<dyn SyncStore>,
}

impl Persistence for SyncPersistence {
    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        self.store.set_item(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.store.remove_item(key)
    }

    fn clear(&self) -> StoreResult<()> {
        self.store.clear()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
