//! SQLite handle for the indexed store.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes async methods that use
//! `tokio::task::spawn_blocking` to avoid blocking the async runtime.
//! The entry methods at the bottom each run in their own transaction
//! against the single `entries` collection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info, instrument};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Thread-safe handle to a SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database at `path` and apply pragmas.
    ///
    /// This call blocks briefly (file I/O); [`Database::open_and_migrate`]
    /// wraps it in `spawn_blocking`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening indexed store");

        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database, used by tests and `IndexedLocation::Memory`.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory indexed store");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the database and run the upgrade step if it is new.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending schema migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.execute(migration::run_all).await
    }

    /// Execute a closure against the connection on the blocking pool.
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }

    /// Execute a mutable closure (for transactions) on the blocking pool.
    pub async fn execute_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&mut conn)
        })
        .await?
    }

    // ── entries collection ───────────────────────────────────────────

    /// Read every entry of the collection, consuming the cursor to the end.
    #[instrument(skip(self))]
    pub async fn load_entries(&self) -> StoreResult<HashMap<String, String>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM entries")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut entries = HashMap::new();
            for row in rows {
                let (key, value) = row?;
                entries.insert(key, value);
            }
            debug!(count = entries.len(), "entries loaded");
            Ok(entries)
        })
        .await
    }

    /// Insert or replace one entry.
    #[instrument(skip(self, value))]
    pub async fn put_entry(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute_mut(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO entries (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Delete one entry, returning `true` if it existed.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        self.execute_mut(move |conn| {
            let tx = conn.transaction()?;
            let deleted = tx.execute(
                "DELETE FROM entries WHERE key = ?1",
                rusqlite::params![key],
            )?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Delete every entry of the collection.
    #[instrument(skip(self))]
    pub async fn clear_entries(&self) -> StoreResult<usize> {
        self.execute_mut(|conn| {
            let tx = conn.transaction()?;
            let deleted = tx.execute("DELETE FROM entries", [])?;
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    // ── pragmas ──────────────────────────────────────────────────────

    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        // WAL mode: readers do not block the writer task.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL; only the last transaction can be
        // lost on power failure.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.pragma_update(None, "temp_store", "MEMORY")?;

        // Another process holding the file waits instead of failing.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        debug!("indexed store pragmas applied");
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
