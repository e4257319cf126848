//! Shared context handed to every structure emulator.
//!
//! One [`StoreContext`] owns the connection, the table, the key namespace,
//! the codec and the sequencer of a brain. Clones are cheap and share all
//! of them, so independent brains can coexist in one process.

use rusqlite::Connection;
use serde_json::Value;

use crate::codec::Codec;
use crate::config::BrainConfig;
use crate::db::Database;
use crate::error::StoreResult;
use crate::keys::KeyCodec;
use crate::rows::RowStore;
use crate::schema;
use crate::sequencer::{Sequencer, SequencerStats};

#[derive(Clone)]
pub struct StoreContext {
    db: Database,
    rows: RowStore,
    keys: KeyCodec,
    codec: Codec,
    sequencer: Sequencer,
}

impl StoreContext {
    /// Build a context over `db` and make sure the table exists.
    ///
    /// A schema failure is returned; a degraded `db` is accepted and every
    /// later operation on it fails instead.
    pub async fn new(db: Database, config: &BrainConfig) -> StoreResult<Self> {
        config.validate()?;
        let ctx = Self {
            rows: RowStore::new(&config.table_name, config.codec())?,
            keys: KeyCodec::new(config.prefix.as_str()),
            codec: config.codec(),
            sequencer: Sequencer::new(db.clone(), config.failure_policy),
            db,
        };

        if ctx.db.is_open() {
            let table = config.table_name.clone();
            ctx.db
                .execute(move |conn| schema::ensure(conn, &table))
                .await?;
        }
        Ok(ctx)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn rows(&self) -> &RowStore {
        &self.rows
    }

    pub fn keys(&self) -> &KeyCodec {
        &self.keys
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn sequencer_stats(&self) -> &SequencerStats {
        self.sequencer.stats()
    }

    /// Run a closure directly against the row store, bypassing the
    /// sequencer. Used for reads and for single-statement writes.
    pub async fn direct<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection, &RowStore, Codec) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let rows = self.rows.clone();
        let codec = self.codec;
        self.db.execute(move |conn| f(conn, &rows, codec)).await
    }

    /// Run a read/modify/write closure as one sequencer unit.
    pub async fn exclusive<F, T>(&self, name: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection, &RowStore, Codec) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let rows = self.rows.clone();
        let codec = self.codec;
        self.sequencer
            .run_exclusive(name, move |conn| f(conn, &rows, codec))
            .await
    }
}

/// Decode an optional cell, treating NULL cells as JSON null.
pub(crate) fn decode_cell(codec: Codec, cell: Option<Vec<u8>>) -> Value {
    cell.map_or(Value::Null, |bytes| codec.decode(&bytes))
}
