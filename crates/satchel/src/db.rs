//! SQLite connection management: one shared handle, WAL mode, pragmas.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes async methods that use
//! `tokio::task::spawn_blocking` to avoid blocking the async runtime.
//!
//! There is no hidden global: the application's composition root constructs
//! one `Database` and hands out clones. Every clone shares the same
//! underlying connection, so repositories built on top of it serialize
//! against each other exactly as the engine's single-writer model requires.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::migration::Migrations;
use crate::repo::TxScope;

/// Thread-safe handle to a SQLite database.
///
/// All read/write operations go through [`Database::execute`] which
/// dispatches onto the blocking thread pool via `tokio::task::spawn_blocking`.
/// The handle is cheap to clone; clones share the connection.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl Database {
    /// Open (or create) a database at `path` with default tuning.
    ///
    /// This call blocks briefly (file I/O), so call it during startup before
    /// entering the main async loop, or wrap it in `spawn_blocking` yourself.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(&StoreConfig::at(path.as_ref()))
    }

    /// Open a database using an explicit [`StoreConfig`].
    ///
    /// Fails with [`StoreError::Connection`] when the path is not reachable,
    /// the file is missing and `create_if_missing` is off, or the engine
    /// cannot read the file (corruption is probed at open, not deferred to
    /// the first query).
    pub fn open_with(config: &StoreConfig) -> StoreResult<Self> {
        let path = &config.path;
        info!(path = %path.display(), "opening database");

        if config.create_if_missing {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Connection(format!(
                        "cannot create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        } else if !path.exists() {
            return Err(StoreError::Connection(format!(
                "database file does not exist: {}",
                path.display()
            )));
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::Connection(format!("cannot open {}: {e}", path.display()))
        })?;
        // A corrupt or non-database file often survives open() and only
        // fails on the first header read, so classify that as a connection
        // failure too.
        Self::apply_pragmas(&conn, config)
            .and_then(|()| Self::probe(&conn, path))
            .map_err(|e| match e {
                StoreError::Connection(_) => e,
                other => {
                    StoreError::Connection(format!("cannot read {}: {other}", path.display()))
                }
            })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Create an in-memory database — useful for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");

        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("cannot open in-memory database: {e}")))?;
        Self::apply_pragmas(&conn, &StoreConfig::default())?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open the database and bring its schema up to date in one call.
    ///
    /// This is the intended startup entry point: a fresh file gets the full
    /// schema, an existing file gets only the pending steps.
    pub async fn open_and_migrate(
        path: impl AsRef<Path> + Send + 'static,
        migrations: Migrations,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.migrate(migrations).await?;
        Ok(db)
    }

    /// Apply all pending migration steps. See [`Migrations::run`].
    pub async fn migrate(&self, migrations: Migrations) -> StoreResult<u32> {
        self.execute_mut(move |conn| migrations.run(conn)).await
    }

    /// Execute an arbitrary closure against the connection on the blocking pool.
    ///
    /// This is the primary way to interact with the database from async code.
    /// The closure receives a `&Connection` and must return a `StoreResult<T>`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: i64 = db.execute(|conn| {
    ///     let mut stmt = conn.prepare("SELECT count(*) FROM users")?;
    ///     let count = stmt.query_row([], |row| row.get(0))?;
    ///     Ok(count)
    /// }).await?;
    /// ```
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| StoreError::Connection("database is closed".into()))?;
            f(conn)
        })
        .await?
    }

    /// Execute a mutable closure (for transactions, etc.) on the blocking pool.
    ///
    /// The closure receives a `&mut Connection` so you can call
    /// `conn.transaction()` and friends.
    pub async fn execute_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| StoreError::Connection("database is closed".into()))?;
            f(conn)
        })
        .await?
    }

    /// Run a sequence of repository operations atomically.
    ///
    /// The closure receives a [`TxScope`] exposing the same CRUD operations
    /// as [`Repository`](crate::Repository), but synchronous and bound to a
    /// single transaction. If the closure returns `Ok`, the transaction
    /// commits; on any error it rolls back and none of the operations take
    /// effect.
    ///
    /// The write lock is held for the whole closure — keep transactions
    /// short so concurrent writers are not starved.
    pub async fn run_in_transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&TxScope<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute_mut(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            // Dropping `tx` without commit rolls back, so an early `?`
            // return leaves the database untouched.
            let out = f(&TxScope::new(&tx))?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Copy the live database file to `dest` via `VACUUM INTO`.
    ///
    /// The destination must not already exist. The engine refuses to run
    /// this while a write transaction is active, which is exactly the
    /// contract we want for a consistent backup.
    #[instrument(skip(self))]
    pub async fn backup_to(&self, dest: impl Into<PathBuf> + std::fmt::Debug) -> StoreResult<()> {
        let dest = dest.into();
        let shown = dest.display().to_string();
        self.execute(move |conn| {
            let dest = dest.to_str().ok_or_else(|| {
                StoreError::InvalidArgument("backup path is not valid UTF-8".into())
            })?;
            conn.execute("VACUUM INTO ?1", rusqlite::params![dest])?;
            Ok(())
        })
        .await?;
        info!(dest = %shown, "database backed up");
        Ok(())
    }

    /// Close the connection. Later operations fail with
    /// [`StoreError::Connection`]. Closing twice is a no-op.
    pub async fn close(&self) -> StoreResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            match guard.take() {
                Some(c) => c
                    .close()
                    .map_err(|(_conn, e)| StoreError::from(e)),
                None => Ok(()),
            }
        })
        .await?
    }

    // ── pragmas ──────────────────────────────────────────────────────

    /// Apply pragmas to a fresh connection.
    fn apply_pragmas(conn: &Connection, config: &StoreConfig) -> StoreResult<()> {
        debug!("applying SQLite pragmas");

        // WAL mode: concurrent readers, non-blocking writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL — we only lose the last transaction
        // on a power failure, not corruption.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.pragma_update(None, "mmap_size", config.mmap_size as i64)?;

        // Negative cache_size means KiB rather than pages.
        conn.pragma_update(None, "cache_size", -(config.cache_size_kib as i64))?;

        // Temp tables and indices in memory, not on disk.
        conn.pragma_update(None, "temp_store", "MEMORY")?;

        // Enforce foreign key constraints (cascading deletes rely on this).
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Busy timeout so concurrent writers wait instead of failing immediately.
        conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;

        Ok(())
    }

    /// Force a header read so a corrupt or non-database file fails here.
    fn probe(conn: &Connection, path: &Path) -> StoreResult<()> {
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(|e| {
                StoreError::Connection(format!("cannot read {}: {e}", path.display()))
            })?;
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
