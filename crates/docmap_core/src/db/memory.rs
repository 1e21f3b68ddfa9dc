//! In-process document database.
//!
//! Tables live behind a shared handle so several connections (for nested
//! scopes) observe the same data. Every connection call is recorded as a
//! `DbCall`, which lets callers assert how often the store was hit.

use super::{
    assign_key, merge_document, validate_table_name, ConflictPolicy, Connection, DbError,
    DbResult, InsertResult,
};
use crate::model::key::{Document, Key};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// One recorded connection call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbCall {
    Get { table: String, key: Key },
    GetMany { table: String, keys: Vec<Key> },
    Insert { table: String, conflict: ConflictPolicy },
    Close,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, BTreeMap<Key, Document>>,
    calls: Vec<DbCall>,
}

/// Shared in-memory tables. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a new open connection to this database.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            db: self.clone(),
            open: true,
        }
    }

    /// Writes a document directly, bypassing the call log.
    ///
    /// The document must carry a usable `id`.
    pub fn seed(&self, table: &str, document: Document) -> DbResult<Key> {
        validate_table_name(table)?;
        let mut document = document;
        let (key, generated) = assign_key(&mut document)?;
        if generated {
            return Err(DbError::InvalidDocument(
                "seeded documents must carry an id".to_string(),
            ));
        }
        self.state
            .borrow_mut()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(key.clone(), document);
        Ok(key)
    }

    /// Reads a stored document without recording a call.
    pub fn document(&self, table: &str, key: &Key) -> Option<Document> {
        self.state
            .borrow()
            .tables
            .get(table)
            .and_then(|rows| rows.get(key).cloned())
    }

    /// Returns every call recorded so far, oldest first.
    pub fn calls(&self) -> Vec<DbCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    fn record(&self, call: DbCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

/// Connection handed out by `MemoryDatabase::connect`.
pub struct MemoryConnection {
    db: MemoryDatabase,
    open: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> DbResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::Closed)
        }
    }
}

impl Connection for MemoryConnection {
    fn get(&self, table: &str, key: &Key) -> DbResult<Option<Document>> {
        self.ensure_open()?;
        validate_table_name(table)?;
        self.db.record(DbCall::Get {
            table: table.to_string(),
            key: key.clone(),
        });
        Ok(self.db.document(table, key))
    }

    /// Returns matches in key order, which generally differs from request order.
    fn get_many(&self, table: &str, keys: &[Key]) -> DbResult<Vec<Document>> {
        self.ensure_open()?;
        validate_table_name(table)?;
        self.db.record(DbCall::GetMany {
            table: table.to_string(),
            keys: keys.to_vec(),
        });

        let state = self.db.state.borrow();
        let documents = match state.tables.get(table) {
            Some(rows) => rows
                .iter()
                .filter(|(key, _)| keys.contains(key))
                .map(|(_, document)| document.clone())
                .collect(),
            None => Vec::new(),
        };
        Ok(documents)
    }

    fn insert(
        &mut self,
        table: &str,
        mut document: Document,
        conflict: ConflictPolicy,
    ) -> DbResult<InsertResult> {
        self.ensure_open()?;
        validate_table_name(table)?;
        self.db.record(DbCall::Insert {
            table: table.to_string(),
            conflict,
        });

        let (key, generated) = assign_key(&mut document)?;
        let mut result = InsertResult::default();
        if generated {
            result.generated_keys.push(key.clone());
        }

        let mut state = self.db.state.borrow_mut();
        let rows = state.tables.entry(table.to_string()).or_default();
        if let Some(stored) = rows.get_mut(&key) {
            if conflict == ConflictPolicy::Error {
                return Err(DbError::Conflict {
                    table: table.to_string(),
                    key,
                });
            }
            if merge_document(stored, document) {
                result.replaced = 1;
            } else {
                result.unchanged = 1;
            }
        } else {
            rows.insert(key, document);
            result.inserted = 1;
        }

        Ok(result)
    }

    fn close(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        self.open = false;
        self.db.record(DbCall::Close);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
