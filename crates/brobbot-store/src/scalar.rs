//! Scalar values: one subkey-less row per key.

use serde_json::Value;
use tracing::instrument;

use crate::context::StoreContext;
use crate::error::{StoreError, StoreResult};

/// Get/set/increment on plain keys.
#[derive(Clone)]
pub struct ScalarStore {
    ctx: StoreContext,
}

impl ScalarStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    /// Store `value` under `key`, replacing any previous value.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let key = self.ctx.keys().key(key);
        self.ctx
            .direct(move |conn, rows, codec| {
                rows.upsert(conn, &key, None, &codec.encode(&value)?, false)?;
                Ok(())
            })
            .await
    }

    /// The value stored under `key`, or `None`.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let key = self.ctx.keys().key(key);
        self.ctx
            .direct(move |conn, rows, codec| {
                Ok(rows
                    .first_value(conn, &key, None)?
                    .map(|bytes| codec.decode(&bytes)))
            })
            .await
    }

    /// Add `delta` to the integer at `key` and return the new value.
    ///
    /// A missing key counts as absent, so the result is `delta` itself.
    #[instrument(skip(self))]
    pub async fn increment(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let key = self.ctx.keys().key(key);
        self.ctx
            .exclusive("increment", move |conn, rows, codec| {
                let current = rows
                    .first_value(conn, &key, None)?
                    .map(|bytes| codec.decode(&bytes));
                let next = add_integer(&key, current, delta)?;
                rows.upsert(conn, &key, None, &codec.encode(&Value::from(next))?, false)?;
                Ok(next)
            })
            .await
    }

    /// Subtract `delta` from the integer at `key`.
    pub async fn decrement(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let negated = delta.checked_neg().ok_or_else(|| StoreError::Overflow {
            key: self.ctx.keys().key(key),
        })?;
        self.increment(key, negated).await
    }

    /// Whether any row exists for `key`.
    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        let key = self.ctx.keys().key(key);
        self.ctx
            .direct(move |conn, rows, _| rows.exists(conn, &key, None))
            .await
    }

    /// Remove `key` with all of its rows. Returns whether anything was removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        let key = self.ctx.keys().key(key);
        self.ctx
            .direct(move |conn, rows, _| Ok(rows.delete(conn, &key, None)? > 0))
            .await
    }
}

/// `current + delta`, where a missing or null `current` counts as absent.
///
/// Strings holding an integer are accepted so counters written as text by
/// older brains keep working.
pub(crate) fn add_integer(key: &str, current: Option<Value>, delta: i64) -> StoreResult<i64> {
    let not_an_integer = || StoreError::NotAnInteger {
        key: key.to_string(),
    };
    let base = match current {
        None | Some(Value::Null) => return Ok(delta),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(not_an_integer)?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| not_an_integer())?,
        Some(_) => return Err(not_an_integer()),
    };
    base.checked_add(delta).ok_or_else(|| StoreError::Overflow {
        key: key.to_string(),
    })
}

// ── tests ────────────────────────────────────────────────────────────
