//! Document database capability and backends.
//!
//! # Responsibility
//! - Define the raw document operations the model layer consumes.
//! - Provide SQLite-backed and in-memory implementations.
//!
//! # Invariants
//! - Every stored document carries its own key under `id`.
//! - `ConflictPolicy::Update` merges incoming fields over the stored document.
//! - A closed connection rejects every further call with `DbError::Closed`.

use crate::model::key::{Document, Key};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

mod memory;
mod open;

pub use memory::{DbCall, MemoryConnection, MemoryDatabase};
pub use open::{open_db, open_db_in_memory, open_db_with, SqliteConnection};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Json(serde_json::Error),
    Conflict { table: String, key: Key },
    InvalidTableName(String),
    InvalidDocument(String),
    Closed,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::Conflict { table, key } => {
                write!(f, "document with key `{key}` already exists in `{table}`")
            }
            Self::InvalidTableName(name) => write!(f, "invalid table name `{name}`"),
            Self::InvalidDocument(message) => write!(f, "invalid stored document: {message}"),
            Self::Closed => write!(f, "connection is closed"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Conflict { .. }
            | Self::InvalidTableName(_)
            | Self::InvalidDocument(_)
            | Self::Closed => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// What `insert` does when a document with the same key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Reject the write with `DbError::Conflict`.
    Error,
    /// Merge the incoming fields into the stored document.
    Update,
}

/// Outcome counters of one `insert` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertResult {
    /// Keys generated for documents that arrived without `id`.
    pub generated_keys: Vec<Key>,
    pub inserted: u32,
    pub replaced: u32,
    pub unchanged: u32,
}

/// Raw document operations of one database connection.
///
/// Implementations are owned by exactly one scope frame at a time.
pub trait Connection {
    /// Fetches one document by primary key (compound keys included).
    fn get(&self, table: &str, key: &Key) -> DbResult<Option<Document>>;
    /// Fetches every stored document among `keys`, in no particular order.
    fn get_many(&self, table: &str, keys: &[Key]) -> DbResult<Vec<Document>>;
    fn insert(
        &mut self,
        table: &str,
        document: Document,
        conflict: ConflictPolicy,
    ) -> DbResult<InsertResult>;
    /// Releases the connection. Later calls fail with `DbError::Closed`.
    fn close(&mut self) -> DbResult<()>;
    fn is_open(&self) -> bool;
}

/// Resolves the key of an incoming document, generating one when the document
/// has none.
///
/// Returns the key and whether it was generated. A generated key is written
/// back into the document.
pub(crate) fn assign_key(document: &mut Document) -> DbResult<(Key, bool)> {
    match document.get("id") {
        None | Some(Value::Null) => {
            let key = Key::Str(Uuid::new_v4().to_string());
            document.insert("id".to_string(), key.to_value());
            Ok((key, true))
        }
        Some(raw) => match Key::from_value(raw) {
            Some(key) => Ok((key, false)),
            None => Err(DbError::InvalidDocument(format!(
                "unusable document id `{raw}`"
            ))),
        },
    }
}

/// Merges `incoming` over `stored`, returning whether anything changed.
pub(crate) fn merge_document(stored: &mut Document, incoming: Document) -> bool {
    let mut changed = false;
    for (name, value) in incoming {
        if stored.get(&name) != Some(&value) {
            stored.insert(name, value);
            changed = true;
        }
    }
    changed
}

pub(crate) fn validate_table_name(table: &str) -> DbResult<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidTableName(table.to_string()))
    }
}
