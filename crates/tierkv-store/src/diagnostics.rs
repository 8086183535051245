//! Diagnostics sink for swallowed tier errors.
//!
//! Every [`TierError`] the pipeline absorbs is passed to
//! [`Diagnostics::record`], which logs it at the level its variant
//! deserves and bumps a counter, so operators can see a degraded backend
//! even though the consumer never does.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::{PersistOp, TierError};

/// Counters of absorbed failures, shared by the facade and writer tasks.
#[derive(Debug, Default)]
pub struct Diagnostics {
    unavailable: AtomicU64,
    load_failures: AtomicU64,
    write_failures: AtomicU64,
    delete_failures: AtomicU64,
    clear_failures: AtomicU64,
    malformed_entries: AtomicU64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `err` and count it.
    pub fn record(&self, err: &TierError) {
        match err {
            TierError::ProbeUnavailable { kind, reason } => {
                self.unavailable.fetch_add(1, Ordering::Relaxed);
                debug!(backend = %kind, reason = %reason, "backend unavailable");
            }
            TierError::LoadFailure { kind, .. } | TierError::TimedOut { kind, .. } => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(backend = %kind, error = %err, "backend rejected, trying next tier");
            }
            TierError::PersistenceWriteFailure { kind, op, source } => {
                let counter = match op {
                    PersistOp::Write => &self.write_failures,
                    PersistOp::Delete => &self.delete_failures,
                    PersistOp::Clear => &self.clear_failures,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                warn!(backend = %kind, op = %op, error = %source, "persistence call failed, cache kept");
            }
            TierError::MalformedExternalEntry { entry, reason } => {
                self.malformed_entries.fetch_add(1, Ordering::Relaxed);
                debug!(entry = %entry, reason, "skipping malformed seed entry");
            }
        }
    }

    /// Backends that probed as unavailable.
    pub fn unavailable(&self) -> u64 {
        self.unavailable.load(Ordering::Relaxed)
    }

    /// Backends that probed fine but failed or timed out while loading.
    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }

    /// Failed persistence calls of the given kind.
    pub fn persistence_failures(&self, op: PersistOp) -> u64 {
        match op {
            PersistOp::Write => self.write_failures.load(Ordering::Relaxed),
            PersistOp::Delete => self.delete_failures.load(Ordering::Relaxed),
            PersistOp::Clear => self.clear_failures.load(Ordering::Relaxed),
        }
    }

    /// Seed entries skipped as malformed.
    pub fn malformed_entries(&self) -> u64 {
        self.malformed_entries.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unavailable={} load_failures={} write_failures={} delete_failures={} clear_failures={} malformed={}",
            self.unavailable(),
            self.load_failures(),
            self.persistence_failures(PersistOp::Write),
            self.persistence_failures(PersistOp::Delete),
            self.persistence_failures(PersistOp::Clear),
            self.malformed_entries(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::error::StoreError;

    #[test]
    fn counts_by_variant() {
        let diag = Diagnostics::new();
        diag.record(&TierError::unavailable(BackendKind::HostBridge, "no global"));
        diag.record(&TierError::PersistenceWriteFailure {
            kind: BackendKind::SyncStore,
            op: PersistOp::Write,
            source: StoreError::QuotaExceeded { needed: 10, limit: 5 },
        });
        diag.record(&TierError::MalformedExternalEntry {
            entry: "junk".into(),
            reason: "missing '='",
        });

        assert_eq!(diag.unavailable(), 1);
        assert_eq!(diag.persistence_failures(PersistOp::Write), 1);
        assert_eq!(diag.persistence_failures(PersistOp::Clear), 0);
        assert_eq!(diag.malformed_entries(), 1);
        assert!(diag.to_string().contains("write_failures=1"));
    }
}
