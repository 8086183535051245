//! Tier selection.
//!
//! The [`InitializationSequencer`] walks its candidates in priority order.
//! The first one whose probe and bulk load both succeed is bound into the
//! facade (`Loaded`). If none do, the in-memory tier is bound
//! (`Fallback`). Either way readiness resolves exactly once, and a
//! rejected tier is never retried within the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{
    Backend, BackendKind, BridgeBackend, IndexedBackend, LoadedCache, MemoryBackend,
    NoopPersistence, SyncStoreBackend,
};
use crate::config::StoreConfig;
use crate::diagnostics::Diagnostics;
use crate::environment::HostEnvironment;
use crate::error::TierError;
use crate::facade::StorageFacade;

/// Where the sequencer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Trying the candidate at this index.
    Probing(usize),
    /// A real backend was bound. Terminal.
    Loaded(BackendKind),
    /// Every candidate failed; memory only. Terminal.
    Fallback,
}

impl SequencerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Probing(_))
    }
}

/// Runs the probes and finalizes the facade.
pub struct InitializationSequencer {
    candidates: Vec<Box<dyn Backend>>,
    fallback: MemoryBackend,
    timeout: Option<Duration>,
    state: SequencerState,
}

impl InitializationSequencer {
    /// Sequencer over `candidates`, highest priority first.
    pub fn new(candidates: Vec<Box<dyn Backend>>, fallback: MemoryBackend) -> Self {
        Self {
            candidates,
            fallback,
            timeout: None,
            state: SequencerState::Probing(0),
        }
    }

    /// Standard tier order over what `env` provides.
    pub fn from_environment(env: HostEnvironment, config: &StoreConfig) -> Self {
        let candidates: Vec<Box<dyn Backend>> = vec![
            Box::new(SyncStoreBackend::new(env.sync_store)),
            Box::new(IndexedBackend::new(env.indexed)),
            Box::new(BridgeBackend::new(
                env.globals,
                config.bridge_globals.clone(),
                config.well_known_keys.clone(),
            )),
        ];
        Self::new(candidates, MemoryBackend::new(env.seed)).with_timeout(config.probe_timeout())
    }

    /// Bound probe plus load of each candidate. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Select a tier, populate `facade` and resolve its readiness.
    pub async fn run(&mut self, facade: &StorageFacade) -> BackendKind {
        let diagnostics = facade.diagnostics_handle();

        for (index, candidate) in self.candidates.iter().enumerate() {
            self.state = SequencerState::Probing(index);
            let kind = candidate.kind();
            debug!(backend = %kind, index, "probing");

            match attempt(candidate.as_ref(), &diagnostics, self.timeout).await {
                Ok(loaded) => {
                    info!(
                        backend = %kind,
                        entries = loaded.entries.len(),
                        "storage backend selected"
                    );
                    facade.finalize(kind, loaded);
                    self.state = SequencerState::Loaded(kind);
                    return kind;
                }
                Err(err) => diagnostics.record(&err),
            }
        }

        self.state = SequencerState::Fallback;
        warn!("no persistent storage available; data will not survive this session");
        let loaded = match attempt(&self.fallback, &diagnostics, None).await {
            Ok(loaded) => loaded,
            Err(err) => {
                diagnostics.record(&err);
                LoadedCache {
                    entries: HashMap::new(),
                    binding: Arc::new(NoopPersistence),
                }
            }
        };
        facade.finalize(BackendKind::InMemory, loaded);
        BackendKind::InMemory
    }
}

/// Probe then load one candidate, under the optional bound.
async fn attempt(
    candidate: &dyn Backend,
    diagnostics: &Arc<Diagnostics>,
    timeout: Option<Duration>,
) -> Result<LoadedCache, TierError> {
    let kind = candidate.kind();
    let work = async {
        let handle = candidate.probe().await?;
        debug!(backend = %kind, "probe succeeded, loading");
        handle.load(Arc::clone(diagnostics)).await
    };

    match timeout {
        Some(after) => tokio::time::timeout(after, work)
            .await
            .map_err(|_| TierError::TimedOut { kind, after })?,
        None => work.await,
    }
}
