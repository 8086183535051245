//! Public storage API.
//!
//! [`StorageFacade`] answers every read from the in-memory cache and
//! forwards every mutation, after updating the cache, to whichever
//! persistence binding the sequencer installed. Persistence failures are
//! recorded in [`Diagnostics`] and never reach the caller.
//!
//! Construct one facade at startup and hand clones to consumers; clones
//! share the same cache and binding.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::backend::{BackendKind, LoadedCache, Persistence};
use crate::cache::{CacheStats, EntryCache};
use crate::config::StoreConfig;
use crate::diagnostics::Diagnostics;
use crate::environment::HostEnvironment;
use crate::error::{PersistOp, StoreResult, TierError};
use crate::sequencer::InitializationSequencer;

/// Persistence installed by the sequencer, tagged with its tier.
struct Binding {
    kind: BackendKind,
    persistence: Arc<dyn Persistence>,
}

struct Inner {
    cache: EntryCache,
    selection: OnceLock<BackendKind>,
    binding: OnceLock<Binding>,
    diagnostics: Arc<Diagnostics>,
    ready: watch::Sender<Option<BackendKind>>,
}

/// Cache-first key/value store over the selected backend.
#[derive(Clone)]
pub struct StorageFacade {
    inner: Arc<Inner>,
}

impl Default for StorageFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFacade")
            .field("backend", &self.backend_kind())
            .field("entries", &self.len())
            .finish()
    }
}

impl StorageFacade {
    /// An uninitialized facade: empty cache, no-op persistence, not ready.
    pub fn new() -> Self {
        let (ready, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                cache: EntryCache::new(),
                selection: OnceLock::new(),
                binding: OnceLock::new(),
                diagnostics: Arc::new(Diagnostics::new()),
                ready,
            }),
        }
    }

    /// Build a facade over the environment `config` describes and start
    /// tier selection in the background.
    ///
    /// Must be called within a Tokio runtime.
    pub fn open(config: &StoreConfig) -> Self {
        Self::open_with(config, HostEnvironment::from_config(config))
    }

    /// Like [`StorageFacade::open`], over an explicit environment.
    pub fn open_with(config: &StoreConfig, env: HostEnvironment) -> Self {
        let facade = Self::new();
        let mut sequencer = InitializationSequencer::from_environment(env, config);
        let handle = facade.clone();
        tokio::spawn(async move {
            sequencer.run(&handle).await;
        });
        facade
    }

    // ── reads ────────────────────────────────────────────────────────

    /// The cached value for `key`. Never touches a backend.
    ///
    /// Before readiness this sees only what has been set so far.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.cache.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.is_empty()
    }

    /// All cached keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.cache.keys()
    }

    // ── mutations ────────────────────────────────────────────────────

    /// Store the string form of `value` under `key`.
    pub fn set(&self, key: &str, value: impl ToString) {
        let value = value.to_string();
        self.inner.cache.insert(key, value.clone());
        self.persist(PersistOp::Write, |p| p.write(key, &value));
    }

    pub fn remove(&self, key: &str) {
        self.inner.cache.remove(key);
        self.persist(PersistOp::Delete, |p| p.delete(key));
    }

    pub fn clear(&self) {
        self.inner.cache.clear();
        self.persist(PersistOp::Clear, |p| p.clear());
    }

    /// Wait until every persistence call dispatched so far has completed.
    ///
    /// Mutations never need this; it exists for shutdown paths that must
    /// not drop queued writes.
    pub async fn flush(&self) {
        if let Some(done) = self.inner.binding.get().and_then(|b| b.persistence.flush()) {
            let _ = done.await;
        }
    }

    fn persist(&self, op: PersistOp, call: impl FnOnce(&dyn Persistence) -> StoreResult<()>) {
        let Some(binding) = self.inner.binding.get() else {
            return;
        };
        if let Err(source) = call(binding.persistence.as_ref()) {
            self.inner.diagnostics.record(&TierError::PersistenceWriteFailure {
                kind: binding.kind,
                op,
                source,
            });
        }
    }

    // ── introspection ────────────────────────────────────────────────

    /// The selected tier, or `None` before readiness.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.inner.selection.get().copied()
    }

    /// One-shot signal resolving to the selected tier.
    pub fn when_ready(&self) -> ReadySignal {
        ReadySignal {
            rx: self.inner.ready.subscribe(),
        }
    }

    /// Cache lookup counters.
    pub fn stats(&self) -> &CacheStats {
        self.inner.cache.stats()
    }

    /// Absorbed failure counters.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    pub(crate) fn diagnostics_handle(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.inner.diagnostics)
    }

    // ── initialization ───────────────────────────────────────────────

    /// Install the selected tier. Only the first call has any effect.
    ///
    /// The binding is installed and the load merged before the selection
    /// is published, so once `backend_kind()` is `Some` every mutation is
    /// persisted.
    pub(crate) fn finalize(&self, kind: BackendKind, loaded: LoadedCache) {
        let binding = Binding {
            kind,
            persistence: loaded.binding,
        };
        if self.inner.binding.set(binding).is_err() {
            warn!(backend = %kind, "backend already selected, ignoring");
            return;
        }
        let merged = self.inner.cache.merge_loaded(loaded.entries);
        let _ = self.inner.selection.set(kind);
        self.inner.ready.send_replace(Some(kind));
        debug!(backend = %kind, merged, "storage ready");
    }
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// Resolves once the facade has a backend and a fully loaded cache.
///
/// Await it directly (`facade.when_ready().await`) or poll
/// [`ReadySignal::is_ready`].
#[derive(Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<Option<BackendKind>>,
}

impl ReadySignal {
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the selected tier.
    pub async fn wait(mut self) -> BackendKind {
        let selected = match self.rx.wait_for(Option::is_some).await {
            Ok(kind) => *kind,
            Err(_) => None,
        };
        // A closed channel means every facade handle was dropped before a
        // tier was bound, so nothing was ever persisted.
        selected.unwrap_or(BackendKind::InMemory)
    }
}

impl IntoFuture for ReadySignal {
    type Output = BackendKind;
    type IntoFuture = Pin<Box<dyn Future<Output = BackendKind> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
