//! In-memory entry cache.
//!
//! The cache is the only thing reads ever touch. It is unbounded and has
//! no TTL; entries leave only through an explicit remove or clear.
//!
//! Until the bulk load is merged, removals and clears are also remembered,
//! so a key deleted before readiness does not come back from the backend.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use tracing::debug;

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache lookups.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Total cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Total lookups (hits + misses).
    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Hit rate as a value between 0.0 and 1.0 (returns 0.0 if no lookups).
    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} total={} rate={:.2}%",
            self.hits(),
            self.misses(),
            self.total(),
            self.hit_rate() * 100.0,
        )
    }
}

// ── entry cache ──────────────────────────────────────────────────────

/// Deletions made before the bulk load was merged.
#[derive(Debug, Default)]
struct PreLoad {
    removed: HashSet<String>,
    cleared: bool,
}

/// String-to-string map backing every facade read.
#[derive(Debug)]
pub struct EntryCache {
    inner: DashMap<String, String>,
    stats: CacheStats,
    /// `None` once [`EntryCache::merge_loaded`] has run.
    pre_load: Mutex<Option<PreLoad>>,
}

impl Default for EntryCache {
    fn default() -> Self {
        Self {
            inner: DashMap::new(),
            stats: CacheStats::default(),
            pre_load: Mutex::new(Some(PreLoad::default())),
        }
    }
}

impl EntryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, Option<PreLoad>> {
        // Poisoning is ignored; the guarded state is plain data.
        self.pre_load.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a value by key. Returns `None` on miss.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.inner.get(key) {
            Some(value) => {
                self.stats.record_hit();
                Some(value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Insert or replace a value.
    pub fn insert(&self, key: &str, value: String) {
        self.inner.insert(key.to_string(), value);
    }

    /// Remove a key, returning `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut pre_load = self.pending();
        if let Some(pending) = pre_load.as_mut() {
            pending.removed.insert(key.to_string());
        }
        self.inner.remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut pre_load = self.pending();
        if let Some(pending) = pre_load.as_mut() {
            pending.removed.clear();
            pending.cleared = true;
        }
        self.inner.clear();
    }

    /// Merge a bulk-loaded map. Only the first call has any effect.
    ///
    /// Keys already present win over loaded ones. Keys removed before the
    /// merge are skipped, and a clear before the merge discards the whole
    /// load. Returns the number of loaded entries actually inserted.
    pub fn merge_loaded(&self, entries: HashMap<String, String>) -> usize {
        let mut pre_load = self.pending();
        let Some(pending) = pre_load.take() else {
            return 0;
        };
        if pending.cleared {
            debug!(discarded = entries.len(), "cache cleared before load, nothing merged");
            return 0;
        }

        let mut inserted = 0;
        for (key, value) in entries {
            if pending.removed.contains(&key) {
                continue;
            }
            self.inner.entry(key).or_insert_with(|| {
                inserted += 1;
                value
            });
        }
        debug!(inserted, total = self.inner.len(), "bulk load merged into cache");
        inserted
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Lookup counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

// ── tests ────────────────────────────────────────────────────────────
