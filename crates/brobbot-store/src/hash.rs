//! Hashes: one row per field, all sharing the hash's key, with the field
//! name in `subkey`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::instrument;

use crate::context::{StoreContext, decode_cell};
use crate::error::StoreResult;
use crate::rows::Upserted;
use crate::scalar::add_integer;

/// How hash names map onto storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Inside the data namespace (`"<prefix>:<name>"`).
    Namespaced,
    /// Used verbatim, for reserved keys such as the user registry.
    Reserved,
}

/// Field-level operations on hash keys.
#[derive(Clone)]
pub struct HashStore {
    ctx: StoreContext,
    scope: Scope,
}

impl HashStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            ctx,
            scope: Scope::Namespaced,
        }
    }

    /// A hash store whose names bypass the data namespace.
    pub(crate) fn reserved(ctx: StoreContext) -> Self {
        Self {
            ctx,
            scope: Scope::Reserved,
        }
    }

    fn storage_key(&self, table: &str) -> String {
        match self.scope {
            Scope::Namespaced => self.ctx.keys().key(table),
            Scope::Reserved => table.to_string(),
        }
    }

    /// Set `field` to `value`; returns `true` if the field was created.
    #[instrument(skip(self, value))]
    pub async fn set(&self, table: &str, field: &str, value: Value) -> StoreResult<bool> {
        let key = self.storage_key(table);
        let field = field.to_string();
        self.ctx
            .exclusive("hash_set", move |conn, rows, codec| {
                let bytes = codec.encode(&value)?;
                let outcome = rows.upsert(conn, &key, Some(field.as_str()), &bytes, false)?;
                Ok(outcome == Upserted::Inserted)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, table: &str, field: &str) -> StoreResult<Option<Value>> {
        let key = self.storage_key(table);
        let field = field.to_string();
        self.ctx
            .direct(move |conn, rows, codec| {
                Ok(rows
                    .first_value(conn, &key, Some(field.as_str()))?
                    .map(|bytes| codec.decode(&bytes)))
            })
            .await
    }

    /// Remove `field`; returns whether it existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, table: &str, field: &str) -> StoreResult<bool> {
        let key = self.storage_key(table);
        let field = field.to_string();
        self.ctx
            .direct(move |conn, rows, _| {
                Ok(rows.delete(conn, &key, Some(field.as_str()))? > 0)
            })
            .await
    }

    /// Field names in creation order.
    #[instrument(skip(self))]
    pub async fn fields(&self, table: &str) -> StoreResult<Vec<String>> {
        let key = self.storage_key(table);
        self.ctx
            .direct(move |conn, rows, _| rows.subkeys(conn, &key))
            .await
    }

    /// Every value stored under the hash's key.
    #[instrument(skip(self))]
    pub async fn values(&self, table: &str) -> StoreResult<Vec<Value>> {
        let key = self.storage_key(table);
        self.ctx
            .direct(move |conn, rows, codec| {
                Ok(rows
                    .get(conn, &key, None)?
                    .into_iter()
                    .map(|row| decode_cell(codec, row.value))
                    .collect())
            })
            .await
    }

    /// Number of rows under the hash's key, or `None` if there are none.
    #[instrument(skip(self))]
    pub async fn size(&self, table: &str) -> StoreResult<Option<usize>> {
        let key = self.storage_key(table);
        self.ctx
            .direct(move |conn, rows, _| {
                let count = rows.count(conn, &key)?;
                Ok((count > 0).then_some(count))
            })
            .await
    }

    /// Every field with its decoded value.
    #[instrument(skip(self))]
    pub async fn get_all(&self, table: &str) -> StoreResult<HashMap<String, Value>> {
        let key = self.storage_key(table);
        self.ctx
            .direct(move |conn, rows, codec| {
                Ok(rows
                    .get(conn, &key, None)?
                    .into_iter()
                    .filter_map(|row| {
                        let field = row.subkey?;
                        Some((field, decode_cell(codec, row.value)))
                    })
                    .collect())
            })
            .await
    }

    /// Add `delta` to the integer in `field` and return the new value.
    #[instrument(skip(self))]
    pub async fn increment_field(&self, table: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let key = self.storage_key(table);
        let field = field.to_string();
        self.ctx
            .exclusive("hash_increment", move |conn, rows, codec| {
                let current = rows
                    .first_value(conn, &key, Some(field.as_str()))?
                    .map(|bytes| codec.decode(&bytes));
                let next = add_integer(&format!("{key}.{field}"), current, delta)?;
                let bytes = codec.encode(&Value::from(next))?;
                rows.upsert(conn, &key, Some(field.as_str()), &bytes, false)?;
                Ok(next)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
