//! Primary keys and raw documents.
//!
//! # Invariants
//! - A `Key` is always a scalar or an ordered sequence of keys, never a map.
//! - The canonical text form (`Key::canonical`) is stable and is what storage
//!   backends index by.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Untyped name→value mapping as stored in and fetched from the database.
pub type Document = Map<String, Value>;

/// Primary key of a stored document.
///
/// Serialized untagged, so a key is written to documents as the plain JSON
/// number, string or array it represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
    /// Multi-part key addressed as one ordered tuple.
    Compound(Vec<Key>),
}

impl Key {
    /// Translates key parts into native compound-key addressing.
    ///
    /// One part stays a scalar key; two or more become `Key::Compound`.
    /// Returns `None` for an empty part list.
    pub fn from_parts(parts: impl IntoIterator<Item = Key>) -> Option<Key> {
        let mut parts: Vec<Key> = parts.into_iter().collect();
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Key::Compound(parts)),
        }
    }

    /// Reads a key out of a raw document value.
    ///
    /// `null`, empty strings and non-integral numbers are not usable keys.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::String(text) if text.is_empty() => None,
            Value::Null => None,
            other => Key::deserialize(other).ok(),
        }
    }

    /// Raw document representation of this key.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(value) => Value::from(*value),
            Self::Str(value) => Value::String(value.clone()),
            Self::Compound(parts) => Value::Array(parts.iter().map(Key::to_value).collect()),
        }
    }

    /// Compact JSON text used as the storage index for this key.
    pub fn canonical(&self) -> String {
        self.to_value().to_string()
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
            Self::Compound(parts) => {
                write!(f, "[")?;
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Key>> for Key {
    fn from(parts: Vec<Key>) -> Self {
        Self::Compound(parts)
    }
}
