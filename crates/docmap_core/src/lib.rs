//! Object/document mapping over a document database.
//!
//! Model types declare their attributes once, convert to and from raw
//! documents, and load through a scoped identity map so each stored
//! document has at most one live instance per scope.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod scope;

pub use config::{CoreConfig, DatabaseConfig};
pub use db::{
    open_db, open_db_in_memory, open_db_with, ConflictPolicy, Connection, DbCall, DbError,
    DbResult, InsertResult, MemoryConnection, MemoryDatabase, SqliteConnection,
};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::attribute::{AttributeKind, Codec, Plain, Reference};
pub use model::key::{Document, Key};
pub use model::mappable::{Describe, Mappable};
pub use model::persist::{Batch, Model};
pub use model::schema::{AttributeInfo, Schema, SchemaBuilder};
pub use model::{ModelError, ModelResult};
pub use scope::{Handle, IdentityMap, ScopeGuard, ScopeStack};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
