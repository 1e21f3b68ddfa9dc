//! Conversion between typed instances and raw documents.
//!
//! # Invariants
//! - Decoding starts from every attribute's default, so omitted document keys
//!   never leave stale values behind.
//! - Document keys without a declared attribute are ignored.
//! - Encoding emits every declared attribute, defaults included.

use crate::model::error::ModelResult;
use crate::model::key::Document;
use crate::model::schema::Schema;
use crate::scope::ScopeStack;
use std::fmt::{Display, Formatter};

/// A type with a declared attribute mapping.
///
/// Implementors return a schema built once, typically from a
/// `once_cell::sync::Lazy` static.
pub trait Mappable: Default + 'static {
    fn schema() -> &'static Schema<Self>;

    /// Instance with every declared attribute at its descriptor default.
    fn with_defaults() -> Self {
        let mut instance = Self::default();
        Self::schema().reset(&mut instance);
        instance
    }

    /// Builds an instance from `document`.
    ///
    /// Reference attributes resolve through `scope`; plain-only types never
    /// touch it.
    fn from_document(document: &Document, scope: &mut ScopeStack) -> ModelResult<Self> {
        let mut instance = Self::default();
        instance.load_document(document, scope)?;
        Ok(instance)
    }

    /// Resets this instance to defaults and decodes `document` into it.
    fn load_document(&mut self, document: &Document, scope: &mut ScopeStack) -> ModelResult<()> {
        Self::schema().load(self, document, scope)
    }

    fn to_document(&self) -> ModelResult<Document> {
        Self::schema().dump(self)
    }

    /// `<TypeName: attr=value, ...>` in declaration order. Diagnostic only.
    fn describe(&self) -> Describe<'_, Self> {
        Describe(self)
    }
}

/// Display adapter returned by `Mappable::describe`.
pub struct Describe<'a, M>(&'a M);

impl<M: Mappable> Display for Describe<'_, M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&M::schema().render(self.0))
    }
}
