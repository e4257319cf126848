//! SQLite connection handle with WAL mode and performance pragmas.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes async methods that use
//! `tokio::task::spawn_blocking` to avoid blocking the async runtime.
//!
//! A handle can also be *degraded* (the file could not be opened) or
//! *closed*; in both states every call fails without touching SQLite.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};

enum ConnState {
    Open(Connection),
    Unavailable(String),
    Closed,
}

/// Thread-safe handle to a SQLite database.
///
/// All read/write operations go through [`Database::execute`] which
/// dispatches onto the blocking thread pool via `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<ConnState>>,
}

impl Database {
    /// Open (or create) a database at `path` and apply performance pragmas.
    ///
    /// This call blocks briefly (file I/O), so call it during startup before
    /// entering the main async loop, or use [`Database::open_or_degraded`].
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;

        Ok(Self::from_state(ConnState::Open(conn)))
    }

    /// Create an in-memory database, mostly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn)?;

        Ok(Self::from_state(ConnState::Open(conn)))
    }

    /// Open the database on the blocking pool, falling back to a degraded
    /// handle if it cannot be opened.
    ///
    /// The failure is logged once here; afterwards every operation on the
    /// handle returns [`StoreError::Unavailable`].
    pub async fn open_or_degraded(path: impl AsRef<Path> + Send + 'static) -> Self {
        let path = path.as_ref().to_path_buf();
        let shown = path.display().to_string();
        let opened = tokio::task::spawn_blocking(move || Self::open(&path))
            .await
            .map_err(StoreError::from)
            .and_then(|r| r);

        match opened {
            Ok(db) => db,
            Err(err) => {
                error!(path = %shown, %err, "failed to open database, continuing degraded");
                Self::degraded(err.to_string())
            }
        }
    }

    /// A handle whose every operation fails with [`StoreError::Unavailable`].
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::from_state(ConnState::Unavailable(reason.into()))
    }

    fn from_state(state: ConnState) -> Self {
        Self {
            conn: Arc::new(Mutex::new(state)),
        }
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
    ///     let count = conn.query_row("SELECT count(*) FROM brobbot", [], |row| row.get(0))?;
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
            let state = acquire(&conn);
            match &*state {
                ConnState::Open(conn) => f(conn),
                ConnState::Unavailable(reason) => Err(StoreError::Unavailable(reason.clone())),
                ConnState::Closed => Err(StoreError::Closed),
            }
        })
        .await?
    }

    /// Close the connection. Later calls fail with [`StoreError::Closed`].
    ///
    /// Closing an already closed or degraded handle is a no-op.
    pub async fn close(&self) -> StoreResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut state = acquire(&conn);
            match std::mem::replace(&mut *state, ConnState::Closed) {
                ConnState::Open(conn) => {
                    conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
                    info!("database closed");
                    Ok(())
                }
                previous @ ConnState::Unavailable(_) => {
                    *state = previous;
                    Ok(())
                }
                ConnState::Closed => Ok(()),
            }
        })
        .await?
    }

    /// `true` while the connection is usable.
    pub fn is_open(&self) -> bool {
        matches!(*acquire(&self.conn), ConnState::Open(_))
    }

    // ── pragmas ──────────────────────────────────────────────────────

    /// Apply all performance pragmas to a fresh connection.
    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        debug!("applying SQLite performance pragmas");

        // WAL mode: readers are not blocked by the single writer.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL: we only lose the last transaction
        // on a power failure, not corruption.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        // Temp tables and indices in memory, not on disk.
        conn.pragma_update(None, "temp_store", "MEMORY")?;

        // Another process holding the file makes writers wait instead of failing.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        info!("database pragmas applied (WAL, synchronous=NORMAL)");
        Ok(())
    }
}

/// Lock the connection state, recovering from a panic in an earlier closure.
///
/// A closure that panicked may have left a transaction open; it is rolled
/// back before the connection is handed out again.
fn acquire(conn: &Mutex<ConnState>) -> MutexGuard<'_, ConnState> {
    match conn.lock() {
        Ok(state) => state,
        Err(poisoned) => {
            conn.clear_poison();
            let state = poisoned.into_inner();
            if let ConnState::Open(open) = &*state
                && !open.is_autocommit()
            {
                warn!("rolling back transaction left open by a panicked task");
                if let Err(err) = open.execute_batch("ROLLBACK") {
                    error!(%err, "rollback after panic failed");
                }
            }
            state
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
