//! Sets: list storage with the `isset` flag raised.
//!
//! Membership is the contract, order is not. Apart from [`SetStore::add`],
//! every operation delegates to the list implementation; list writes never
//! clear the flag.

use ring::rand::{SecureRandom, SystemRandom};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::context::StoreContext;
use crate::error::{StoreError, StoreResult};
use crate::list::{self, ListStore};

/// Membership operations on set keys.
#[derive(Clone)]
pub struct SetStore {
    ctx: StoreContext,
    lists: ListStore,
}

impl SetStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            lists: ListStore::new(ctx.clone()),
            ctx,
        }
    }

    /// Add `value` to the set.
    ///
    /// Returns `false` without writing anything if it is already a member.
    #[instrument(skip(self, value))]
    pub async fn add(&self, key: &str, value: Value) -> StoreResult<bool> {
        let storage_key = self.ctx.keys().key(key);
        self.ctx
            .exclusive("set_add", move |conn, rows, codec| {
                let mut members = list::load(conn, rows, codec, &storage_key)?.unwrap_or_default();
                if members.contains(&value) {
                    debug!(key = %storage_key, "already a member");
                    return Ok(false);
                }
                members.push(value);
                list::save(conn, rows, codec, &storage_key, members, true)?;
                rows.mark_set(conn, &storage_key)?;
                Ok(true)
            })
            .await
    }

    /// Remove `value`; returns whether it was a member.
    #[instrument(skip(self, value))]
    pub async fn remove(&self, key: &str, value: Value) -> StoreResult<bool> {
        Ok(self.lists.remove_all(key, value).await? > 0)
    }

    /// Number of members, or `None` if the set is absent.
    pub async fn size(&self, key: &str) -> StoreResult<Option<usize>> {
        self.lists.length(key).await
    }

    /// Remove and return a member (the most recently added one).
    pub async fn pop(&self, key: &str) -> StoreResult<Option<Value>> {
        self.lists.pop_right(key).await
    }

    /// A uniformly chosen member, without removing it.
    #[instrument(skip(self))]
    pub async fn random_member(&self, key: &str) -> StoreResult<Option<Value>> {
        let Some(mut members) = self.members(key).await? else {
            return Ok(None);
        };
        if members.is_empty() {
            return Ok(None);
        }
        let at = uniform_index(members.len())?;
        Ok(Some(members.swap_remove(at)))
    }

    pub async fn is_member(&self, key: &str, value: Value) -> StoreResult<bool> {
        Ok(self
            .members(key)
            .await?
            .is_some_and(|members| members.contains(&value)))
    }

    /// Every member, or `None` if the set is absent.
    pub async fn members(&self, key: &str) -> StoreResult<Option<Vec<Value>>> {
        self.lists.all(key).await
    }
}

/// Uniform index in `0..len` from the system CSPRNG, rejection-sampled so
/// every index is equally likely.
fn uniform_index(len: usize) -> StoreResult<usize> {
    let bound = len as u64;
    let zone = u64::MAX - (u64::MAX % bound);
    let rng = SystemRandom::new();
    loop {
        let mut buf = [0u8; 8];
        rng.fill(&mut buf)
            .map_err(|_| StoreError::InvalidArgument("failed to generate random index".into()))?;
        let n = u64::from_le_bytes(buf);
        if n < zone {
            return Ok((n % bound) as usize);
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
