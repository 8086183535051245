//! Tier 2: SQLite indexed store.
//!
//! Probing opens the versioned database and runs the upgrade step, which
//! creates the `entries` collection on first open. Loading reads the whole
//! collection. Mutations are queued on an unbounded channel and applied by
//! a single writer task, one transaction per operation, so they never
//! block the caller and land in dispatch order.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{Backend, BackendHandle, BackendKind, LoadedCache, Persistence};
use crate::db::Database;
use crate::diagnostics::Diagnostics;
use crate::error::{PersistOp, StoreError, StoreResult, TierError};

/// Where the indexed store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexedLocation {
    /// A database file on disk.
    File(PathBuf),
    /// A private in-memory database (tests, ephemeral embedders).
    Memory,
}

/// Strategy for the indexed tier.
pub struct IndexedBackend {
    location: Option<IndexedLocation>,
}

impl IndexedBackend {
    pub fn new(location: Option<IndexedLocation>) -> Self {
        Self { location }
    }
}

#[async_trait]
impl Backend for IndexedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::IndexedStore
    }

    async fn probe(&self) -> Result<Box<dyn BackendHandle>, TierError> {
        let unavailable =
            |e: StoreError| TierError::unavailable(BackendKind::IndexedStore, e.to_string());

        let db = match &self.location {
            None => {
                return Err(TierError::unavailable(
                    BackendKind::IndexedStore,
                    "no indexed store in this environment",
                ));
            }
            Some(IndexedLocation::File(path)) => Database::open_and_migrate(path.clone())
                .await
                .map_err(unavailable)?,
            Some(IndexedLocation::Memory) => {
                let db = Database::open_in_memory().map_err(unavailable)?;
                db.run_migrations().await.map_err(unavailable)?;
                db
            }
        };

        Ok(Box::new(IndexedHandle { db }))
    }
}

struct IndexedHandle {
    db: Database,
}

#[async_trait]
impl BackendHandle for IndexedHandle {
    async fn load(
        self: Box<Self>,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<LoadedCache, TierError> {
        let entries = self
            .db
            .load_entries()
            .await
            .map_err(|source| TierError::LoadFailure {
                kind: BackendKind::IndexedStore,
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(self.db, rx, diagnostics));

        Ok(LoadedCache {
            entries,
            binding: Arc::new(IndexedPersistence { tx }),
        })
    }
}

// ---------------------------------------------------------------------------
// Writer task
// ---------------------------------------------------------------------------

enum WriteOp {
    Put { key: String, value: String },
    Delete { key: String },
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Apply queued operations until every sender is gone.
async fn run_writer(
    db: Database,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    diagnostics: Arc<Diagnostics>,
) {
    debug!("indexed store writer started");
    while let Some(op) = rx.recv().await {
        let (op, result) = match op {
            WriteOp::Put { key, value } => (PersistOp::Write, db.put_entry(&key, &value).await),
            WriteOp::Delete { key } => (PersistOp::Delete, db.delete_entry(&key).await.map(drop)),
            WriteOp::Clear => (PersistOp::Clear, db.clear_entries().await.map(drop)),
            WriteOp::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };
        if let Err(source) = result {
            diagnostics.record(&TierError::PersistenceWriteFailure {
                kind: BackendKind::IndexedStore,
                op,
                source,
            });
        }
    }
    debug!("indexed store writer stopped");
}

/// Dispatches mutations to the writer task.
struct IndexedPersistence {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl IndexedPersistence {
    fn dispatch(&self, op: WriteOp) -> StoreResult<()> {
        self.tx
            .send(op)
            .map_err(|_| StoreError::Closed("indexed store writer has stopped".into()))
    }
}

impl Persistence for IndexedPersistence {
    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        self.dispatch(WriteOp::Put {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.dispatch(WriteOp::Delete {
            key: key.to_string(),
        })
    }

    fn clear(&self) -> StoreResult<()> {
        self.dispatch(WriteOp::Clear)
    }

    fn flush(&self) -> Option<oneshot::Receiver<()>> {
        let (done, wait) = oneshot::channel();
        self.dispatch(WriteOp::Flush(done)).ok().map(|()| wait)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_location_is_unavailable() {
        let err = IndexedBackend::new(None).probe().await.err().unwrap();
        assert!(matches!(
            err,
            TierError::ProbeUnavailable {
                kind: BackendKind::IndexedStore,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unopenable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("kv.db");
        let backend = IndexedBackend::new(Some(IndexedLocation::File(path)));
        assert!(backend.probe().await.is_err());
    }

    #[tokio::test]
    async fn load_reads_prepopulated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        {
            let db = Database::open_and_migrate(path.clone()).await.unwrap();
            db.put_entry("a", "1").await.unwrap();
            db.put_entry("b", "2").await.unwrap();
        }

        let backend = IndexedBackend::new(Some(IndexedLocation::File(path)));
        let handle = backend.probe().await.unwrap();
        let loaded = handle.load(Arc::new(Diagnostics::new())).await.unwrap();

        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries["a"], "1");
        assert_eq!(loaded.entries["b"], "2");
    }

    #[tokio::test]
    async fn writes_land_in_order_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        let backend = IndexedBackend::new(Some(IndexedLocation::File(path.clone())));
        let loaded = backend
            .probe()
            .await
            .unwrap()
            .load(Arc::new(Diagnostics::new()))
            .await
            .unwrap();

        let binding = loaded.binding;
        binding.write("k", "old").unwrap();
        binding.write("k", "new").unwrap();
        binding.write("gone", "x").unwrap();
        binding.delete("gone").unwrap();
        binding.flush().unwrap().await.unwrap();

        let db = Database::open(&path).unwrap();
        let entries = db.load_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["k"], "new");
    }

    #[tokio::test]
    async fn writer_failures_are_counted_per_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let diagnostics = Arc::new(Diagnostics::new());

        let backend = IndexedBackend::new(Some(IndexedLocation::File(path.clone())));
        let loaded = backend
            .probe()
            .await
            .unwrap()
            .load(Arc::clone(&diagnostics))
            .await
            .unwrap();

        // Break the collection underneath the writer task.
        let other = Database::open(&path).unwrap();
        other
            .execute(|conn| {
                conn.execute_batch("DROP TABLE entries;")?;
                Ok(())
            })
            .await
            .unwrap();

        let binding = loaded.binding;
        binding.write("k", "v").unwrap();
        binding.delete("k").unwrap();
        binding.clear().unwrap();
        binding.flush().unwrap().await.unwrap();

        assert_eq!(diagnostics.persistence_failures(PersistOp::Write), 1);
        assert_eq!(diagnostics.persistence_failures(PersistOp::Delete), 1);
        assert_eq!(diagnostics.persistence_failures(PersistOp::Clear), 1);
    }
}
