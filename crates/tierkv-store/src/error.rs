//! Error types for the tierkv-store crate.
//!
//! Native backend calls return [`StoreError`] via [`StoreResult`].
//! Tier-level outcomes (probe, load, persistence, seed parsing) are
//! described by [`TierError`]. Neither type ever crosses the
//! [`StorageFacade`](crate::StorageFacade) boundary: they are logged and
//! counted, then dropped.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendKind;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a native backend operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// A write would push the store past its size limit.
    #[error("quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded { needed: usize, limit: usize },

    /// The native object does not provide this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The backend has shut down and can no longer accept work.
    #[error("backend closed: {0}")]
    Closed(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// The persistence operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOp {
    Write,
    Delete,
    Clear,
}

impl fmt::Display for PersistOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Delete => write!(f, "delete"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// Outcomes of the tier selection and persistence pipeline.
#[derive(Debug, Error)]
pub enum TierError {
    /// The backend is not usable in this environment. Expected; drives fallback.
    #[error("{kind} unavailable: {reason}")]
    ProbeUnavailable { kind: BackendKind, reason: String },

    /// The backend probed fine but its bulk load failed.
    #[error("{kind} load failed: {source}")]
    LoadFailure {
        kind: BackendKind,
        #[source]
        source: StoreError,
    },

    /// Probe plus load did not finish within the configured bound.
    #[error("{kind} did not become ready within {after:?}")]
    TimedOut { kind: BackendKind, after: Duration },

    /// A post-initialization write, delete or clear did not reach the backend.
    #[error("{kind} {op} failed: {source}")]
    PersistenceWriteFailure {
        kind: BackendKind,
        op: PersistOp,
        #[source]
        source: StoreError,
    },

    /// One entry of the seed source could not be parsed.
    #[error("malformed seed entry {entry:?}: {reason}")]
    MalformedExternalEntry { entry: String, reason: &'static str },
}

impl TierError {
    pub(crate) fn unavailable(kind: BackendKind, reason: impl Into<String>) -> Self {
        Self::ProbeUnavailable {
            kind,
            reason: reason.into(),
        }
    }

    /// The tier this error is about, if any.
    pub fn kind(&self) -> Option<BackendKind> {
        match self {
            Self::ProbeUnavailable { kind, .. }
            | Self::LoadFailure { kind, .. }
            | Self::TimedOut { kind, .. }
            | Self::PersistenceWriteFailure { kind, .. } => Some(*kind),
            Self::MalformedExternalEntry { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_backend_tag() {
        let err = TierError::unavailable(BackendKind::SyncStore, "disabled");
        assert_eq!(err.to_string(), "primary-sync-store unavailable: disabled");
    }

    #[test]
    fn persistence_failure_mentions_op() {
        let err = TierError::PersistenceWriteFailure {
            kind: BackendKind::IndexedStore,
            op: PersistOp::Delete,
            source: StoreError::Closed("writer gone".into()),
        };
        let text = err.to_string();
        assert!(text.contains("async-indexed-store"));
        assert!(text.contains("delete"));
        assert_eq!(err.kind(), Some(BackendKind::IndexedStore));
    }

    #[test]
    fn malformed_entry_has_no_kind() {
        let err = TierError::MalformedExternalEntry {
            entry: "=x".into(),
            reason: "empty key",
        };
        assert!(err.kind().is_none());
    }
}
