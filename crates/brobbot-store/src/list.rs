//! Lists: the whole sequence lives in one row as one encoded array.
//!
//! Every mutation is a sequencer unit that reads the sequence (a missing
//! key reads as empty), changes it in memory and writes it back, so
//! concurrent pushes and pops never lose updates.

use rusqlite::Connection;
use serde_json::Value;
use tracing::instrument;

use crate::codec::Codec;
use crate::context::StoreContext;
use crate::error::{StoreError, StoreResult};
use crate::rows::RowStore;

/// Most nulls [`ListStore::set_at`] will pad in before the written element.
pub const MAX_SET_AT_GAP: usize = 10_000;

/// Where [`ListStore::insert`] places the new element relative to the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

/// Push/pop/splice operations on list keys.
#[derive(Clone)]
pub struct ListStore {
    ctx: StoreContext,
}

impl ListStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    /// Prepend `value`; returns the new length.
    #[instrument(skip(self, value))]
    pub async fn push_left(&self, key: &str, value: Value) -> StoreResult<usize> {
        self.mutate("push_left", key, move |values| {
            values.insert(0, value);
            Some(values.len())
        })
        .await
        .map(|len| len.unwrap_or_default())
    }

    /// Append `value`; returns the new length.
    #[instrument(skip(self, value))]
    pub async fn push_right(&self, key: &str, value: Value) -> StoreResult<usize> {
        self.mutate("push_right", key, move |values| {
            values.push(value);
            Some(values.len())
        })
        .await
        .map(|len| len.unwrap_or_default())
    }

    /// Remove and return the first element.
    #[instrument(skip(self))]
    pub async fn pop_left(&self, key: &str) -> StoreResult<Option<Value>> {
        self.pop(key, End::Left).await
    }

    /// Remove and return the last element.
    #[instrument(skip(self))]
    pub async fn pop_right(&self, key: &str) -> StoreResult<Option<Value>> {
        self.pop(key, End::Right).await
    }

    /// Insert `value` before or after the first element equal to `pivot`.
    ///
    /// Returns the new length, or `None` when the pivot is not in the list;
    /// nothing is written in that case.
    #[instrument(skip(self, pivot, value))]
    pub async fn insert(
        &self,
        key: &str,
        placement: Placement,
        pivot: Value,
        value: Value,
    ) -> StoreResult<Option<usize>> {
        self.mutate("insert", key, move |values| {
            let idx = values.iter().position(|v| *v == pivot)?;
            let at = match placement {
                Placement::Before => idx,
                Placement::After => idx + 1,
            };
            values.insert(at, value);
            Some(values.len())
        })
        .await
    }

    /// Overwrite the element at `index`.
    ///
    /// Negative indices count from the end and must land inside the list.
    /// A non-negative index past the end grows the list, filling the gap
    /// with nulls; the gap may be at most [`MAX_SET_AT_GAP`] elements.
    #[instrument(skip(self, value))]
    pub async fn set_at(&self, key: &str, index: i64, value: Value) -> StoreResult<()> {
        let storage_key = self.ctx.keys().key(key);
        self.ctx
            .exclusive("set_at", move |conn, rows, codec| {
                let mut values = load(conn, rows, codec, &storage_key)?.unwrap_or_default();
                let at = if index < 0 {
                    resolve_index(values.len(), index).ok_or_else(|| {
                        StoreError::InvalidArgument(format!(
                            "index {index} out of range for {storage_key}"
                        ))
                    })?
                } else {
                    usize::try_from(index).map_err(|_| {
                        StoreError::InvalidArgument(format!("index {index} out of range"))
                    })?
                };
                if at >= values.len() {
                    if at - values.len() > MAX_SET_AT_GAP {
                        return Err(StoreError::InvalidArgument(format!(
                            "index {index} is more than {MAX_SET_AT_GAP} past the end of {storage_key}"
                        )));
                    }
                    values.resize(at + 1, Value::Null);
                }
                values[at] = value;
                save(conn, rows, codec, &storage_key, values, false)
            })
            .await
    }

    /// Remove every element equal to `value`; returns how many were removed.
    #[instrument(skip(self, value))]
    pub async fn remove_all(&self, key: &str, value: Value) -> StoreResult<usize> {
        let storage_key = self.ctx.keys().key(key);
        self.ctx
            .exclusive("remove_all", move |conn, rows, codec| {
                let Some(mut values) = load(conn, rows, codec, &storage_key)? else {
                    return Ok(0);
                };
                let before = values.len();
                values.retain(|v| *v != value);
                let removed = before - values.len();
                save(conn, rows, codec, &storage_key, values, false)?;
                Ok(removed)
            })
            .await
    }

    /// Elements from `start` to `end`, both inclusive.
    ///
    /// Negative indices count from the end (`-1` is the last element), so
    /// `range(key, 0, -1)` is the whole list. `None` if the list is absent.
    #[instrument(skip(self))]
    pub async fn range(&self, key: &str, start: i64, end: i64) -> StoreResult<Option<Vec<Value>>> {
        Ok(self.all(key).await?.map(|values| {
            match resolve_range(values.len(), start, end) {
                Some((from, to)) => values[from..=to].to_vec(),
                None => Vec::new(),
            }
        }))
    }

    /// Number of elements, or `None` if the list is absent.
    #[instrument(skip(self))]
    pub async fn length(&self, key: &str) -> StoreResult<Option<usize>> {
        Ok(self.all(key).await?.map(|values| values.len()))
    }

    /// Element at `index` (negative counts from the end), or `None` if the
    /// list is absent or the index is out of bounds.
    #[instrument(skip(self))]
    pub async fn index(&self, key: &str, index: i64) -> StoreResult<Option<Value>> {
        Ok(self.all(key).await?.and_then(|mut values| {
            resolve_index(values.len(), index).map(|at| values.swap_remove(at))
        }))
    }

    /// The whole list, or `None` if it is absent.
    #[instrument(skip(self))]
    pub async fn all(&self, key: &str) -> StoreResult<Option<Vec<Value>>> {
        let storage_key = self.ctx.keys().key(key);
        self.ctx
            .direct(move |conn, rows, codec| load(conn, rows, codec, &storage_key))
            .await
    }

    // ── internals ────────────────────────────────────────────────────

    async fn pop(&self, key: &str, end: End) -> StoreResult<Option<Value>> {
        let storage_key = self.ctx.keys().key(key);
        self.ctx
            .exclusive("pop", move |conn, rows, codec| {
                let Some(mut values) = load(conn, rows, codec, &storage_key)? else {
                    return Ok(None);
                };
                let popped = match end {
                    End::Left if !values.is_empty() => Some(values.remove(0)),
                    End::Left => None,
                    End::Right => values.pop(),
                };
                save(conn, rows, codec, &storage_key, values, false)?;
                Ok(popped)
            })
            .await
    }

    /// Read, apply `f`, and write back unless `f` returns `None`.
    async fn mutate<F, T>(&self, name: &'static str, key: &str, f: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&mut Vec<Value>) -> Option<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage_key = self.ctx.keys().key(key);
        self.ctx
            .exclusive(name, move |conn, rows, codec| {
                let mut values = load(conn, rows, codec, &storage_key)?.unwrap_or_default();
                let Some(out) = f(&mut values) else {
                    return Ok(None);
                };
                save(conn, rows, codec, &storage_key, values, false)?;
                Ok(Some(out))
            })
            .await
    }
}

#[derive(Debug, Clone, Copy)]
enum End {
    Left,
    Right,
}

/// Load the sequence stored at `key`, or `None` if the key is absent.
pub(crate) fn load(
    conn: &Connection,
    rows: &RowStore,
    codec: Codec,
    key: &str,
) -> StoreResult<Option<Vec<Value>>> {
    let Some(bytes) = rows.first_value(conn, key, None)? else {
        return Ok(None);
    };
    match codec.decode(&bytes) {
        Value::Array(values) => Ok(Some(values)),
        _ => Err(StoreError::WrongType {
            key: key.to_string(),
            expected: "list",
        }),
    }
}

/// Write the sequence back. `isset` only applies when the row is created.
pub(crate) fn save(
    conn: &Connection,
    rows: &RowStore,
    codec: Codec,
    key: &str,
    values: Vec<Value>,
    isset: bool,
) -> StoreResult<()> {
    let bytes = codec.encode(&Value::Array(values))?;
    rows.upsert(conn, key, None, &bytes, isset)?;
    Ok(())
}

/// Map a possibly negative index onto `0..len`.
fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let at = if index < 0 { len + index } else { index };
    (0..len).contains(&at).then(|| at as usize)
}

/// Clamp an inclusive, possibly negative range onto `0..len`.
fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    (start <= end && start < len).then(|| (start as usize, end as usize))
}

// ── tests ────────────────────────────────────────────────────────────
