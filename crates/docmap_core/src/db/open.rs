//! SQLite-backed document connection.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections and configure pragmas.
//! - Store each model table as `(key, document)` rows with JSON documents.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout set.
//! - Tables are created on first use; `key` holds `Key::canonical()` text.

use super::{
    assign_key, merge_document, validate_table_name, ConflictPolicy, Connection, DbError,
    DbResult, InsertResult,
};
use crate::config::DatabaseConfig;
use crate::model::key::{Document, Key};
use log::{error, info};
use rusqlite::{params, params_from_iter, ErrorCode, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Document connection over one SQLite database.
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
}

/// Opens a SQLite database file as a document connection.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<SqliteConnection> {
    open_logged("file", DEFAULT_BUSY_TIMEOUT, move || {
        rusqlite::Connection::open(path)
    })
}

/// Opens a private in-memory SQLite database as a document connection.
pub fn open_db_in_memory() -> DbResult<SqliteConnection> {
    open_logged("memory", DEFAULT_BUSY_TIMEOUT, rusqlite::Connection::open_in_memory)
}

/// Opens the database described by `config`.
///
/// A config without `path` opens an in-memory database.
pub fn open_db_with(config: &DatabaseConfig) -> DbResult<SqliteConnection> {
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    match &config.path {
        Some(path) => open_logged("file", busy_timeout, || rusqlite::Connection::open(path)),
        None => open_logged(
            "memory",
            busy_timeout,
            rusqlite::Connection::open_in_memory,
        ),
    }
}

fn open_logged(
    mode: &str,
    busy_timeout: Duration,
    open: impl FnOnce() -> rusqlite::Result<rusqlite::Connection>,
) -> DbResult<SqliteConnection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, busy_timeout) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(SqliteConnection { conn: Some(conn) })
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &rusqlite::Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

impl SqliteConnection {
    fn live(&self) -> DbResult<&rusqlite::Connection> {
        self.conn.as_ref().ok_or(DbError::Closed)
    }

    fn live_mut(&mut self) -> DbResult<&mut rusqlite::Connection> {
        self.conn.as_mut().ok_or(DbError::Closed)
    }
}

fn ensure_table(conn: &rusqlite::Connection, table: &str) -> DbResult<()> {
    validate_table_name(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            key TEXT PRIMARY KEY NOT NULL,
            document TEXT NOT NULL
        );"
    ))?;
    Ok(())
}

fn parse_document(text: &str) -> DbResult<Document> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(document) => Ok(document),
        other => Err(DbError::InvalidDocument(format!(
            "expected a JSON object, found `{other}`"
        ))),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

impl Connection for SqliteConnection {
    fn get(&self, table: &str, key: &Key) -> DbResult<Option<Document>> {
        let conn = self.live()?;
        ensure_table(conn, table)?;

        let text: Option<String> = conn
            .query_row(
                &format!("SELECT document FROM \"{table}\" WHERE key = ?1;"),
                params![key.canonical()],
                |row| row.get(0),
            )
            .optional()?;

        text.as_deref().map(parse_document).transpose()
    }

    fn get_many(&self, table: &str, keys: &[Key]) -> DbResult<Vec<Document>> {
        let conn = self.live()?;
        ensure_table(conn, table)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT document FROM \"{table}\" WHERE key IN ({placeholders});"
        ))?;
        let mut rows = stmt.query(params_from_iter(keys.iter().map(Key::canonical)))?;
        let mut documents = Vec::new();

        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            documents.push(parse_document(&text)?);
        }

        Ok(documents)
    }

    fn insert(
        &mut self,
        table: &str,
        mut document: Document,
        conflict: ConflictPolicy,
    ) -> DbResult<InsertResult> {
        let conn = self.live_mut()?;
        ensure_table(conn, table)?;

        let (key, generated) = assign_key(&mut document)?;
        let mut result = InsertResult::default();
        if generated {
            result.generated_keys.push(key.clone());
        }

        let tx = conn.transaction()?;
        let stored: Option<String> = tx
            .query_row(
                &format!("SELECT document FROM \"{table}\" WHERE key = ?1;"),
                params![key.canonical()],
                |row| row.get(0),
            )
            .optional()?;

        match (stored, conflict) {
            (None, _) => {
                let text = serde_json::to_string(&document)?;
                if let Err(err) = tx.execute(
                    &format!("INSERT INTO \"{table}\" (key, document) VALUES (?1, ?2);"),
                    params![key.canonical(), text],
                ) {
                    if is_constraint_violation(&err) {
                        return Err(DbError::Conflict {
                            table: table.to_string(),
                            key,
                        });
                    }
                    return Err(err.into());
                }
                result.inserted = 1;
            }
            (Some(_), ConflictPolicy::Error) => {
                return Err(DbError::Conflict {
                    table: table.to_string(),
                    key,
                });
            }
            (Some(text), ConflictPolicy::Update) => {
                let mut merged = parse_document(&text)?;
                if merge_document(&mut merged, document) {
                    tx.execute(
                        &format!("UPDATE \"{table}\" SET document = ?2 WHERE key = ?1;"),
                        params![key.canonical(), serde_json::to_string(&merged)?],
                    )?;
                    result.replaced = 1;
                } else {
                    result.unchanged = 1;
                }
            }
        }
        tx.commit()?;

        Ok(result)
    }

    fn close(&mut self) -> DbResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(conn, err)| {
                self.conn = Some(conn);
                DbError::from(err)
            }),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{open_db_in_memory, open_db_with};
    use crate::config::DatabaseConfig;
    use crate::db::{ConflictPolicy, Connection, DbError};
    use crate::model::key::Key;
    use serde_json::json;

    #[test]
    fn open_with_default_config_is_in_memory() {
        let mut conn = open_db_with(&DatabaseConfig::default()).unwrap();
        assert!(conn.is_open());
        conn.close().unwrap();
        assert!(!conn.is_open());
    }

    #[test]
    fn closed_connection_rejects_reads() {
        let mut conn = open_db_in_memory().unwrap();
        conn.close().unwrap();
        let err = conn.get("users", &Key::from("a")).unwrap_err();
        assert!(matches!(err, DbError::Closed));
    }

    #[test]
    fn invalid_table_name_is_rejected_before_sql() {
        let conn = open_db_in_memory().unwrap();
        let err = conn.get("bad name", &Key::from("a")).unwrap_err();
        assert!(matches!(err, DbError::InvalidTableName(name) if name == "bad name"));
    }

    #[test]
    fn stored_document_carries_generated_id() {
        let mut conn = open_db_in_memory().unwrap();
        let document = json!({ "name": "ann" }).as_object().cloned().unwrap();
        let result = conn
            .insert("users", document, ConflictPolicy::Error)
            .unwrap();
        let key = result.generated_keys[0].clone();

        let loaded = conn.get("users", &key).unwrap().unwrap();
        assert_eq!(loaded["id"], key.to_value());
        assert_eq!(loaded["name"], "ann");
    }
}
