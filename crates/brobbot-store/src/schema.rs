//! Schema for the single backing table.
//!
//! The table name is configurable, so the DDL is rendered per table and
//! applied with `IF NOT EXISTS`; opening an existing brain is a no-op.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::validate_identifier;
use crate::error::StoreResult;

/// Render the DDL for `table`.
///
/// `UNIQUE (key, subkey)` alone lets several `(key, NULL)` rows coexist,
/// so subkey-less rows get their own partial unique index.
fn ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            key    TEXT NOT NULL,
            subkey TEXT DEFAULT NULL,
            isset  BOOLEAN NOT NULL DEFAULT 0,
            value  BLOB,
            UNIQUE (key, subkey) ON CONFLICT ABORT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS {table}_unique_plain_key ON {table} (key) WHERE subkey IS NULL;
        CREATE INDEX IF NOT EXISTS {table}_key_subkey_isset ON {table} (key, subkey, isset);
        "#
    )
}

/// Create the table and its indices if they do not exist.
///
/// This is a **synchronous** function; call it through `Database::execute`.
pub fn ensure(conn: &Connection, table: &str) -> StoreResult<()> {
    validate_identifier(table)?;
    debug!(table, "ensuring brain schema");
    conn.execute_batch(&ddl(table))?;
    info!(table, "brain schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL ORDER BY name")
            .unwrap();
        stmt.query_map([table], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn creates_table_and_indices() {
        let conn = Connection::open_in_memory().unwrap();
        ensure(&conn, "brobbot").unwrap();
        assert_eq!(
            index_names(&conn, "brobbot"),
            vec!["brobbot_key_subkey_isset", "brobbot_unique_plain_key"]
        );
    }

    #[test]
    fn ensure_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure(&conn, "brobbot").unwrap();
        ensure(&conn, "brobbot").unwrap();
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        ensure(&conn, "brobbot").unwrap();
        let insert = "INSERT INTO brobbot (key, subkey, value) VALUES (?1, ?2, x'00')";

        conn.execute(insert, rusqlite::params!["k", "f"]).unwrap();
        assert!(conn.execute(insert, rusqlite::params!["k", "f"]).is_err());

        conn.execute(insert, rusqlite::params!["plain", None::<String>])
            .unwrap();
        assert!(conn
            .execute(insert, rusqlite::params!["plain", None::<String>])
            .is_err());

        let isset: bool = conn
            .query_row("SELECT isset FROM brobbot WHERE key = 'plain'", [], |r| r.get(0))
            .unwrap();
        assert!(!isset);
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(ensure(&conn, "x; DROP TABLE y").is_err());
    }
}
