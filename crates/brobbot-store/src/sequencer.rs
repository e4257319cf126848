//! Transaction sequencer.
//!
//! Every mutating multi-step operation runs as a *unit*: a closure that
//! performs a read/modify/write against the connection. Units are admitted
//! one at a time through a fair (FIFO) async mutex, so they run end-to-end
//! in submission order, and each is wrapped in `BEGIN` / `COMMIT`.
//!
//! When a unit fails the open transaction is closed according to the
//! [`FailurePolicy`] and the unit's own error is returned to the caller.
//! Read-only operations do not go through the sequencer.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// How an open transaction is closed after its unit failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Issue `COMMIT`: writes made before the failure are kept.
    #[default]
    Commit,
    /// Issue `ROLLBACK`: the unit leaves no trace.
    Rollback,
}

// ── stats ────────────────────────────────────────────────────────────

/// Counters tracking unit envelopes.
#[derive(Debug, Default)]
pub struct SequencerStats {
    begun: AtomicU64,
    committed: AtomicU64,
    failed: AtomicU64,
    rolled_back: AtomicU64,
}

impl SequencerStats {
    /// Record a `BEGIN`, returning its 1-based sequence number.
    fn record_begin(&self) -> u64 {
        self.begun.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_rollback(&self) {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
    }

    /// Units that issued `BEGIN`.
    pub fn begun(&self) -> u64 {
        self.begun.load(Ordering::SeqCst)
    }

    /// Units whose transaction ended in `COMMIT`, failed ones included.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Units whose closure returned an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Units whose transaction ended in `ROLLBACK`.
    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

impl fmt::Display for SequencerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "begun={} committed={} failed={} rolled_back={}",
            self.begun(),
            self.committed(),
            self.failed(),
            self.rolled_back(),
        )
    }
}

// ── sequencer ────────────────────────────────────────────────────────

/// Single-slot FIFO admission queue for transactional units.
///
/// One sequencer exists per brain; clones share the queue.
#[derive(Clone)]
pub struct Sequencer {
    db: Database,
    slot: Arc<tokio::sync::Mutex<()>>,
    policy: FailurePolicy,
    stats: Arc<SequencerStats>,
}

impl Sequencer {
    pub fn new(db: Database, policy: FailurePolicy) -> Self {
        Self {
            db,
            slot: Arc::new(tokio::sync::Mutex::new(())),
            policy,
            stats: Arc::new(SequencerStats::default()),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn stats(&self) -> &SequencerStats {
        &self.stats
    }

    /// Run `unit` inside a transaction once every earlier unit has finished.
    ///
    /// `name` only labels log events.
    pub async fn run_exclusive<F, T>(&self, name: &'static str, unit: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _slot = self.slot.lock().await;
        let policy = self.policy;
        let stats = Arc::clone(&self.stats);

        self.db
            .execute(move |conn| {
                conn.execute_batch("BEGIN")?;
                let seq = stats.record_begin();
                debug!(unit = name, seq, "transaction begun");

                match unit(conn) {
                    Ok(value) => {
                        if let Err(err) = conn.execute_batch("COMMIT") {
                            error!(unit = name, seq, %err, "commit failed, rolling back");
                            if conn.execute_batch("ROLLBACK").is_ok() {
                                stats.record_rollback();
                            }
                            return Err(err.into());
                        }
                        stats.record_commit();
                        debug!(unit = name, seq, "transaction committed");
                        Ok(value)
                    }
                    Err(err) => {
                        stats.record_failure();
                        close_failed(conn, name, seq, policy, &err, &stats);
                        Err(err)
                    }
                }
            })
            .await
    }
}

/// End the transaction of a failed unit; the unit's error wins over any
/// error raised while closing.
fn close_failed(
    conn: &Connection,
    name: &'static str,
    seq: u64,
    policy: FailurePolicy,
    cause: &StoreError,
    stats: &SequencerStats,
) {
    match policy {
        FailurePolicy::Commit => {
            warn!(unit = name, seq, %cause, "unit failed, committing partial writes");
            match conn.execute_batch("COMMIT") {
                Ok(()) => stats.record_commit(),
                Err(err) => {
                    error!(unit = name, seq, %err, "commit after failure failed, rolling back");
                    if conn.execute_batch("ROLLBACK").is_ok() {
                        stats.record_rollback();
                    }
                }
            }
        }
        FailurePolicy::Rollback => {
            warn!(unit = name, seq, %cause, "unit failed, rolling back");
            match conn.execute_batch("ROLLBACK") {
                Ok(()) => stats.record_rollback(),
                Err(err) => error!(unit = name, seq, %err, "rollback failed"),
            }
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
