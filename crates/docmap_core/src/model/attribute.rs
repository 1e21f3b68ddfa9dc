//! Attribute descriptors: defaults plus document encode/decode transforms.
//!
//! # Responsibility
//! - `Plain<T>` maps a field to its JSON value unchanged in shape.
//! - `Reference<M>` maps a field holding another model instance to that
//!   instance's key.
//!
//! # Invariants
//! - Descriptors are immutable after declaration and shared by all instances.
//! - A reference is always stored as a key, never as an embedded document.

use crate::model::error::{ModelError, ModelResult};
use crate::model::key::Key;
use crate::model::persist::Model;
use crate::scope::{Handle, ScopeStack};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Declared behavior class of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Plain,
    /// Holds an instance of the model named `target`.
    Reference { target: &'static str },
}

/// Encode/decode capability shared by every attribute descriptor.
///
/// `name` is the attribute name the descriptor is registered under; it is
/// only used to label errors.
pub trait Codec: Send + Sync + 'static {
    /// In-memory field type.
    type Value;

    fn kind(&self) -> AttributeKind;
    fn default_value(&self) -> Self::Value;
    fn decode(&self, name: &str, raw: &Value, scope: &mut ScopeStack)
        -> ModelResult<Self::Value>;
    fn encode(&self, name: &str, value: &Self::Value) -> ModelResult<Value>;
    /// Diagnostic rendering used by `Mappable::describe`.
    fn render(&self, value: &Self::Value) -> String;
}

/// Attribute stored as its own JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plain<T> {
    default: T,
}

impl<T> Plain<T> {
    pub fn new(default: T) -> Self {
        Self { default }
    }

    pub fn default_ref(&self) -> &T {
        &self.default
    }
}

impl<T> Codec for Plain<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Value = T;

    fn kind(&self) -> AttributeKind {
        AttributeKind::Plain
    }

    fn default_value(&self) -> T {
        self.default.clone()
    }

    fn decode(&self, name: &str, raw: &Value, _scope: &mut ScopeStack) -> ModelResult<T> {
        T::deserialize(raw).map_err(|err| ModelError::InvalidValue {
            attribute: name.to_string(),
            message: err.to_string(),
        })
    }

    fn encode(&self, name: &str, value: &T) -> ModelResult<Value> {
        serde_json::to_value(value).map_err(|err| ModelError::InvalidValue {
            attribute: name.to_string(),
            message: err.to_string(),
        })
    }

    fn render(&self, value: &T) -> String {
        match serde_json::to_value(value) {
            Ok(raw) => raw.to_string(),
            Err(_) => "<unrenderable>".to_string(),
        }
    }
}

/// Attribute holding an instance of model `M`, stored as that instance's key.
///
/// Decoding goes through `M::get`, so an instance already cached in the
/// active scope is reused instead of fetched again. `None` maps to `null`.
pub struct Reference<M> {
    _target: PhantomData<fn() -> M>,
}

impl<M> Reference<M> {
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<M> Default for Reference<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Codec for Reference<M> {
    type Value = Option<Handle<M>>;

    fn kind(&self) -> AttributeKind {
        AttributeKind::Reference {
            target: M::schema().name(),
        }
    }

    fn default_value(&self) -> Self::Value {
        None
    }

    fn decode(
        &self,
        name: &str,
        raw: &Value,
        scope: &mut ScopeStack,
    ) -> ModelResult<Self::Value> {
        if raw.is_null() {
            return Ok(None);
        }
        let key = Key::from_value(raw).ok_or_else(|| ModelError::InvalidReference {
            attribute: name.to_string(),
            reason: format!("`{raw}` is not a usable key"),
        })?;
        M::get(scope, key).map(Some)
    }

    fn encode(&self, name: &str, value: &Self::Value) -> ModelResult<Value> {
        let Some(handle) = value else {
            return Ok(Value::Null);
        };
        let instance = handle
            .try_borrow()
            .map_err(|_| ModelError::InvalidReference {
                attribute: name.to_string(),
                reason: "referenced instance is mutably borrowed".to_string(),
            })?;
        match instance.id() {
            Some(key) => Ok(key.to_value()),
            None => Err(ModelError::InvalidReference {
                attribute: name.to_string(),
                reason: format!("referenced {} has no id", M::schema().name()),
            }),
        }
    }

    fn render(&self, value: &Self::Value) -> String {
        let Some(handle) = value else {
            return "null".to_string();
        };
        let target = M::schema().name();
        match handle.try_borrow() {
            Ok(instance) => match instance.id() {
                Some(key) => format!("<{target} {key}>"),
                None => format!("<{target} unsaved>"),
            },
            Err(_) => format!("<{target} borrowed>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeKind, Codec, Plain};
    use crate::scope::ScopeStack;
    use serde_json::json;

    #[test]
    fn plain_decode_and_encode_are_identity_on_documents() {
        let attr = Plain::new(String::new());
        let mut scope = ScopeStack::new();

        assert_eq!(attr.default_value(), "");
        assert_eq!(attr.decode("name", &json!("foo"), &mut scope).unwrap(), "foo");
        assert_eq!(attr.encode("name", &"foo".to_string()).unwrap(), json!("foo"));
        assert_eq!(attr.kind(), AttributeKind::Plain);
    }

    #[test]
    fn plain_decode_reports_type_mismatch_with_attribute_name() {
        let attr = Plain::new(0_i64);
        let mut scope = ScopeStack::new();

        let err = attr.decode("age", &json!("old"), &mut scope).unwrap_err();
        assert!(err.to_string().contains("`age`"), "unexpected error: {err}");
    }

    #[test]
    fn plain_render_uses_json_text() {
        let attr = Plain::new(Vec::<String>::new());
        assert_eq!(attr.render(&vec!["a".to_string()]), "[\"a\"]");
    }
}
