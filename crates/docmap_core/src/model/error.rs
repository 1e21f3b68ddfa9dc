//! Errors surfaced by mapping and persistence operations.

use crate::db::DbError;
use crate::model::key::Key;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ModelResult<T> = Result<T, ModelError>;

/// Model-layer error. Database failures are carried unchanged in `Db`.
#[derive(Debug)]
pub enum ModelError {
    /// A scoped operation ran with an empty scope stack.
    NoActiveScope,
    /// The active scope's connection is no longer usable.
    NoConnection,
    /// Single-key lookup found no document.
    NotFound { table: String, key: Key },
    /// A reference attribute holds an instance that cannot be stored as a key.
    InvalidReference {
        attribute: String,
        reason: String,
    },
    /// A document value does not fit the attribute's field type.
    InvalidValue {
        attribute: String,
        message: String,
    },
    /// A fetched document has no usable `id`.
    MissingKey { table: String },
    Db(DbError),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveScope => write!(f, "no active connection scope"),
            Self::NoConnection => write!(f, "active scope has no usable connection"),
            Self::NotFound { table, key } => write!(f, "no document `{key}` in `{table}`"),
            Self::InvalidReference { attribute, reason } => {
                write!(f, "invalid reference in `{attribute}`: {reason}")
            }
            Self::InvalidValue { attribute, message } => {
                write!(f, "invalid value for `{attribute}`: {message}")
            }
            Self::MissingKey { table } => {
                write!(f, "document fetched from `{table}` has no usable id")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ModelError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}
