//! The row store: primitive operations on the single backing table.
//!
//! Every higher structure is built from these calls. They are synchronous
//! over a borrowed [`Connection`] so that several of them can run inside one
//! sequencer unit. Query failures are logged here and propagated.

use std::fmt;
use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, error};

use crate::codec::Codec;
use crate::config::validate_identifier;
use crate::error::StoreResult;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// One stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Namespaced storage key.
    pub key: String,
    /// Hash field, `None` for scalars, lists and sets.
    pub subkey: Option<String>,
    /// Marks the storage row of a set.
    pub isset: bool,
    /// Encoded value; `None` for a NULL cell.
    pub value: Option<Vec<u8>>,
}

/// Inferred shape of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Object,
    List,
    Set,
    Hash,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::List => "list",
            Self::Set => "set",
            Self::Hash => "hash",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path [`RowStore::upsert`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

/// Classify a key from one of its rows.
///
/// The priority order is load-bearing: a set's row also holds an encoded
/// sequence, and a hash field may itself hold a sequence.
pub fn classify(row: &Row, codec: Codec) -> KeyType {
    if row.isset {
        KeyType::Set
    } else if row.value.as_deref().is_some_and(|v| codec.is_sequence(v)) {
        KeyType::List
    } else if row.subkey.is_some() {
        KeyType::Hash
    } else {
        KeyType::Object
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  RowStore
// ═══════════════════════════════════════════════════════════════════════

/// Primitive operations on one table.
#[derive(Debug, Clone)]
pub struct RowStore {
    table: Arc<str>,
    codec: Codec,
}

impl RowStore {
    /// Rows of `table`. `codec` is used to read cells SQLite holds as text
    /// or numbers instead of blobs.
    pub fn new(table: &str, codec: Codec) -> StoreResult<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: Arc::from(table),
            codec,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Every row for `key`, or only the `(key, subkey)` row when a subkey
    /// is given.
    pub fn get(&self, conn: &Connection, key: &str, subkey: Option<&str>) -> StoreResult<Vec<Row>> {
        let rows = match subkey {
            Some(subkey) => {
                let sql = format!(
                    "SELECT key, subkey, isset, value FROM {} WHERE key = ?1 AND subkey = ?2 ORDER BY rowid",
                    self.table
                );
                let mut stmt = logged("get", conn.prepare_cached(&sql))?;
                logged(
                    "get",
                    stmt.query_map(params![key, subkey], |row| map_row(row, self.codec))
                        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>()),
                )?
            }
            None => {
                let sql = format!(
                    "SELECT key, subkey, isset, value FROM {} WHERE key = ?1 ORDER BY rowid",
                    self.table
                );
                let mut stmt = logged("get", conn.prepare_cached(&sql))?;
                logged(
                    "get",
                    stmt.query_map(params![key], |row| map_row(row, self.codec))
                        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>()),
                )?
            }
        };
        Ok(rows)
    }

    /// The first row for `key` (`LIMIT 1` point query).
    pub fn first(&self, conn: &Connection, key: &str) -> StoreResult<Option<Row>> {
        let sql = format!(
            "SELECT key, subkey, isset, value FROM {} WHERE key = ?1 ORDER BY rowid LIMIT 1",
            self.table
        );
        let mut stmt = logged("first", conn.prepare_cached(&sql))?;
        logged("first", stmt.query_row(params![key], |row| map_row(row, self.codec)).optional())
    }

    /// Encoded value of the first row for `key`, or of `(key, subkey)`.
    pub fn first_value(
        &self,
        conn: &Connection,
        key: &str,
        subkey: Option<&str>,
    ) -> StoreResult<Option<Vec<u8>>> {
        let row = match subkey {
            Some(_) => self.get(conn, key, subkey)?.into_iter().next(),
            None => self.first(conn, key)?,
        };
        Ok(row.and_then(|r| r.value))
    }

    /// Whether any row exists for `key`, or for `(key, subkey)`.
    pub fn exists(&self, conn: &Connection, key: &str, subkey: Option<&str>) -> StoreResult<bool> {
        let found = match subkey {
            Some(subkey) => {
                let sql = format!(
                    "SELECT 1 FROM {} WHERE key = ?1 AND subkey = ?2 LIMIT 1",
                    self.table
                );
                let mut stmt = logged("exists", conn.prepare_cached(&sql))?;
                logged("exists", stmt.exists(params![key, subkey]))?
            }
            None => {
                let sql = format!("SELECT 1 FROM {} WHERE key = ?1 LIMIT 1", self.table);
                let mut stmt = logged("exists", conn.prepare_cached(&sql))?;
                logged("exists", stmt.exists(params![key]))?
            }
        };
        Ok(found)
    }

    /// Distinct keys that start with `prefix`, matched literally.
    pub fn scan(&self, conn: &Connection, prefix: &str) -> StoreResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT key FROM {} WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key",
            self.table
        );
        let pattern = format!("{}%", escape_like(prefix));
        let mut stmt = logged("scan", conn.prepare_cached(&sql))?;
        logged(
            "scan",
            stmt.query_map(params![pattern], |row| row.get(0))
                .and_then(|rows| rows.collect::<Result<Vec<String>, _>>()),
        )
    }

    /// Insert or update a row after an existence check.
    ///
    /// Updates only replace the value: the `isset` flag keeps whatever it was
    /// on creation. Without a subkey the update covers every row of `key`.
    pub fn upsert(
        &self,
        conn: &Connection,
        key: &str,
        subkey: Option<&str>,
        value: &[u8],
        isset: bool,
    ) -> StoreResult<Upserted> {
        if self.exists(conn, key, subkey)? {
            match subkey {
                Some(subkey) => {
                    let sql = format!(
                        "UPDATE {} SET value = ?3 WHERE key = ?1 AND subkey = ?2",
                        self.table
                    );
                    logged("update", conn.execute(&sql, params![key, subkey, value]))?;
                }
                None => {
                    let sql = format!("UPDATE {} SET value = ?2 WHERE key = ?1", self.table);
                    logged("update", conn.execute(&sql, params![key, value]))?;
                }
            }
            debug!(key, subkey = ?subkey, "row updated");
            Ok(Upserted::Updated)
        } else {
            let sql = format!(
                "INSERT INTO {} (key, subkey, isset, value) VALUES (?1, ?2, ?3, ?4)",
                self.table
            );
            logged("insert", conn.execute(&sql, params![key, subkey, isset, value]))?;
            debug!(key, subkey = ?subkey, isset, "row inserted");
            Ok(Upserted::Inserted)
        }
    }

    /// Set the `isset` flag on the subkey-less row of `key`.
    pub fn mark_set(&self, conn: &Connection, key: &str) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET isset = 1 WHERE key = ?1 AND subkey IS NULL",
            self.table
        );
        logged("mark_set", conn.execute(&sql, params![key]))?;
        Ok(())
    }

    /// Delete every row of `key`, or only `(key, subkey)`. Returns rows removed.
    pub fn delete(&self, conn: &Connection, key: &str, subkey: Option<&str>) -> StoreResult<usize> {
        let removed = match subkey {
            Some(subkey) => {
                let sql = format!("DELETE FROM {} WHERE key = ?1 AND subkey = ?2", self.table);
                logged("delete", conn.execute(&sql, params![key, subkey]))?
            }
            None => {
                let sql = format!("DELETE FROM {} WHERE key = ?1", self.table);
                logged("delete", conn.execute(&sql, params![key]))?
            }
        };
        debug!(key, subkey = ?subkey, removed, "rows deleted");
        Ok(removed)
    }

    /// Delete every row in the table.
    pub fn delete_all(&self, conn: &Connection) -> StoreResult<usize> {
        let sql = format!("DELETE FROM {}", self.table);
        let removed = logged("delete_all", conn.execute(&sql, []))?;
        debug!(removed, "table cleared");
        Ok(removed)
    }

    /// Number of rows stored under `key`.
    pub fn count(&self, conn: &Connection, key: &str) -> StoreResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE key = ?1", self.table);
        let mut stmt = logged("count", conn.prepare_cached(&sql))?;
        let count: i64 = logged("count", stmt.query_row(params![key], |row| row.get(0)))?;
        // COUNT(*) is never negative.
        Ok(count as usize)
    }

    /// Non-null subkeys of `key` in insertion order.
    pub fn subkeys(&self, conn: &Connection, key: &str) -> StoreResult<Vec<String>> {
        let sql = format!(
            "SELECT subkey FROM {} WHERE key = ?1 AND subkey IS NOT NULL ORDER BY rowid",
            self.table
        );
        let mut stmt = logged("subkeys", conn.prepare_cached(&sql))?;
        logged(
            "subkeys",
            stmt.query_map(params![key], |row| row.get(0))
                .and_then(|rows| rows.collect::<Result<Vec<String>, _>>()),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Internals
// ═══════════════════════════════════════════════════════════════════════

fn logged<T>(op: &'static str, result: rusqlite::Result<T>) -> StoreResult<T> {
    result.map_err(|err| {
        error!(op, %err, "sqlite query failed");
        err.into()
    })
}

fn map_row(row: &rusqlite::Row<'_>, codec: Codec) -> rusqlite::Result<Row> {
    Ok(Row {
        key: row.get(0)?,
        subkey: row.get(1)?,
        isset: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
        value: cell_bytes(row.get(3)?, codec),
    })
}

/// Rows written by other tools may hold text or numbers instead of blobs.
fn cell_bytes(cell: SqlValue, codec: Codec) -> Option<Vec<u8>> {
    match cell {
        SqlValue::Null => None,
        SqlValue::Blob(bytes) => Some(bytes),
        SqlValue::Text(text) => Some(codec.from_text_cell(text)),
        SqlValue::Integer(n) => Some(codec.from_text_cell(n.to_string())),
        SqlValue::Real(n) => Some(codec.from_text_cell(n.to_string())),
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ── tests ────────────────────────────────────────────────────────────
