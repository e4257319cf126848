//! The brain: one backing table seen as scalars, lists, sets, hashes and
//! users.
//!
//! [`Brain`] bundles the structure stores around one shared
//! [`StoreContext`] and adds the keyspace-wide operations (key scans, type
//! inference, reset, shutdown).

use tracing::{info, instrument};

use crate::config::BrainConfig;
use crate::context::StoreContext;
use crate::db::Database;
use crate::error::StoreResult;
use crate::hash::HashStore;
use crate::list::ListStore;
use crate::rows::{KeyType, classify};
use crate::scalar::ScalarStore;
use crate::sequencer::SequencerStats;
use crate::set::SetStore;
use crate::users::UserRegistry;

const IN_MEMORY: &str = ":memory:";

/// Handle to one brain. Clones share the connection and the sequencer.
#[derive(Clone)]
pub struct Brain {
    ctx: StoreContext,
    scalars: ScalarStore,
    lists: ListStore,
    sets: SetStore,
    hashes: HashStore,
    users: UserRegistry,
}

impl Brain {
    /// Open the brain described by `config`.
    ///
    /// If the database cannot be opened the failure is logged and a degraded
    /// brain is returned; its operations fail with
    /// [`StoreError::Unavailable`](crate::StoreError::Unavailable). Invalid
    /// configuration is an error.
    pub async fn open(config: &BrainConfig) -> StoreResult<Self> {
        config.validate()?;
        let db = if config.db_name == IN_MEMORY {
            Database::open_in_memory().unwrap_or_else(|err| Database::degraded(err.to_string()))
        } else {
            Database::open_or_degraded(config.db_name.clone()).await
        };
        Self::with_database(db, config).await
    }

    /// Build a brain over an already opened database.
    pub async fn with_database(db: Database, config: &BrainConfig) -> StoreResult<Self> {
        let ctx = StoreContext::new(db, config).await?;
        info!(
            table = config.table_name,
            prefix = config.prefix,
            codec = ?config.codec(),
            "brain ready"
        );
        Ok(Self {
            scalars: ScalarStore::new(ctx.clone()),
            lists: ListStore::new(ctx.clone()),
            sets: SetStore::new(ctx.clone()),
            hashes: HashStore::new(ctx.clone()),
            users: UserRegistry::new(ctx.clone()),
            ctx,
        })
    }

    pub fn scalars(&self) -> &ScalarStore {
        &self.scalars
    }

    pub fn lists(&self) -> &ListStore {
        &self.lists
    }

    pub fn sets(&self) -> &SetStore {
        &self.sets
    }

    pub fn hashes(&self) -> &HashStore {
        &self.hashes
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    /// Envelope counters of this brain's sequencer.
    pub fn sequencer_stats(&self) -> &SequencerStats {
        self.ctx.sequencer_stats()
    }

    /// Logical keys starting with `prefix` (`""` lists every data key).
    #[instrument(skip(self))]
    pub async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let keys = self.ctx.keys().clone();
        let pattern = keys.key(prefix);
        self.ctx
            .direct(move |conn, rows, _| {
                Ok(rows
                    .scan(conn, &pattern)?
                    .iter()
                    .map(|stored| keys.unkey(stored).to_string())
                    .collect())
            })
            .await
    }

    /// Inferred type of `key`, or `None` if it does not exist.
    #[instrument(skip(self))]
    pub async fn type_of(&self, key: &str) -> StoreResult<Option<KeyType>> {
        let key = self.ctx.keys().key(key);
        self.ctx
            .direct(move |conn, rows, codec| {
                Ok(rows.first(conn, &key)?.map(|row| classify(&row, codec)))
            })
            .await
    }

    /// [`Brain::type_of`] for each key, in order.
    pub async fn types(&self, keys: &[&str]) -> StoreResult<Vec<Option<KeyType>>> {
        let mut types = Vec::with_capacity(keys.len());
        for key in keys {
            types.push(self.type_of(key).await?);
        }
        Ok(types)
    }

    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.scalars.exists(key).await
    }

    /// Remove `key` whatever its type.
    pub async fn remove(&self, key: &str) -> StoreResult<bool> {
        self.scalars.delete(key).await
    }

    /// Delete every row of the table, users included.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> StoreResult<()> {
        let removed = self
            .ctx
            .direct(|conn, rows, _| rows.delete_all(conn))
            .await?;
        info!(removed, "brain reset");
        Ok(())
    }

    /// Release the connection. Every later operation fails with
    /// [`StoreError::Closed`](crate::StoreError::Closed).
    pub async fn close(&self) -> StoreResult<()> {
        self.ctx.db().close().await
    }
}

// ── tests ────────────────────────────────────────────────────────────
