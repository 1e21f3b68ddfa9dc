//! Per-type attribute mapping.
//!
//! # Responsibility
//! - Collect the attribute descriptors declared for one type into an ordered
//!   name→descriptor mapping, exactly once per type.
//! - Seed a derived type's mapping from a copy of its parent's mapping.
//!
//! # Invariants
//! - A built `Schema` is never mutated; types expose it from a `Lazy` static.
//! - Redeclaring a name replaces that entry in place, in this schema only.
//! - Every model schema starts with the implicit `id` attribute.

use crate::model::attribute::{AttributeKind, Codec, Plain};
use crate::model::error::ModelResult;
use crate::model::key::{Document, Key};
use crate::model::persist::Model;
use crate::scope::ScopeStack;
use serde_json::Value;
use std::sync::Arc;

/// Descriptor bound to the field it reads and writes on `M`.
trait Binding<M>: Send + Sync {
    fn kind(&self) -> AttributeKind;
    fn default_raw(&self, name: &str) -> ModelResult<Value>;
    fn reset(&self, target: &mut M);
    fn decode_into(
        &self,
        name: &str,
        target: &mut M,
        raw: &Value,
        scope: &mut ScopeStack,
    ) -> ModelResult<()>;
    fn encode_from(&self, name: &str, source: &M) -> ModelResult<Value>;
    fn render(&self, source: &M) -> String;
}

struct Field<M, C: Codec> {
    codec: C,
    get: fn(&M) -> &C::Value,
    get_mut: fn(&mut M) -> &mut C::Value,
}

impl<M, C: Codec> Binding<M> for Field<M, C> {
    fn kind(&self) -> AttributeKind {
        self.codec.kind()
    }

    fn default_raw(&self, name: &str) -> ModelResult<Value> {
        self.codec.encode(name, &self.codec.default_value())
    }

    fn reset(&self, target: &mut M) {
        *(self.get_mut)(target) = self.codec.default_value();
    }

    fn decode_into(
        &self,
        name: &str,
        target: &mut M,
        raw: &Value,
        scope: &mut ScopeStack,
    ) -> ModelResult<()> {
        let value = self.codec.decode(name, raw, scope)?;
        *(self.get_mut)(target) = value;
        Ok(())
    }

    fn encode_from(&self, name: &str, source: &M) -> ModelResult<Value> {
        self.codec.encode(name, (self.get)(source))
    }

    fn render(&self, source: &M) -> String {
        self.codec.render((self.get)(source))
    }
}

/// Parent binding re-targeted at the parent value embedded in `M`.
struct Inherited<M, P> {
    parent: Arc<dyn Binding<P>>,
    project: fn(&M) -> &P,
    project_mut: fn(&mut M) -> &mut P,
}

impl<M, P> Binding<M> for Inherited<M, P> {
    fn kind(&self) -> AttributeKind {
        self.parent.kind()
    }

    fn default_raw(&self, name: &str) -> ModelResult<Value> {
        self.parent.default_raw(name)
    }

    fn reset(&self, target: &mut M) {
        self.parent.reset((self.project_mut)(target));
    }

    fn decode_into(
        &self,
        name: &str,
        target: &mut M,
        raw: &Value,
        scope: &mut ScopeStack,
    ) -> ModelResult<()> {
        self.parent
            .decode_into(name, (self.project_mut)(target), raw, scope)
    }

    fn encode_from(&self, name: &str, source: &M) -> ModelResult<Value> {
        self.parent.encode_from(name, (self.project)(source))
    }

    fn render(&self, source: &M) -> String {
        self.parent.render((self.project)(source))
    }
}

type Entry<M> = (&'static str, Arc<dyn Binding<M>>);

/// Immutable attribute mapping of one type.
pub struct Schema<M> {
    name: &'static str,
    plural_override: Option<String>,
    plural: String,
    attributes: Vec<Entry<M>>,
}

/// Read-only view of one registered attribute.
pub struct AttributeInfo<'a, M> {
    name: &'static str,
    binding: &'a dyn Binding<M>,
}

impl<M> AttributeInfo<'_, M> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.binding.kind()
    }

    /// Document form of the attribute's default value.
    pub fn default_value(&self) -> ModelResult<Value> {
        self.binding.default_raw(self.name)
    }
}

impl<M: 'static> Schema<M> {
    /// Type name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Table name: explicit override, else lowercased type name plus `s`.
    pub fn plural(&self) -> &str {
        &self.plural
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Attribute names in declaration order, inherited ones first.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes.iter().map(|(name, _)| *name)
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeInfo<'_, M>> {
        self.position(name).map(|index| {
            let (name, binding) = &self.attributes[index];
            AttributeInfo {
                name: *name,
                binding: binding.as_ref(),
            }
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|(declared, _)| *declared == name)
    }

    pub(crate) fn reset(&self, target: &mut M) {
        for (_, binding) in &self.attributes {
            binding.reset(target);
        }
    }

    /// Defaults every attribute, then decodes the declared ones present in
    /// `document`. Unknown document keys are ignored.
    pub(crate) fn load(
        &self,
        target: &mut M,
        document: &Document,
        scope: &mut ScopeStack,
    ) -> ModelResult<()> {
        self.reset(target);
        for (name, binding) in &self.attributes {
            if let Some(raw) = document.get(*name) {
                binding.decode_into(name, target, raw, scope)?;
            }
        }
        Ok(())
    }

    pub(crate) fn dump(&self, source: &M) -> ModelResult<Document> {
        let mut document = Document::new();
        for (name, binding) in &self.attributes {
            document.insert((*name).to_string(), binding.encode_from(name, source)?);
        }
        Ok(document)
    }

    pub(crate) fn render(&self, source: &M) -> String {
        let rendered: Vec<String> = self
            .attributes
            .iter()
            .map(|(name, binding)| format!("{name}={}", binding.render(source)))
            .collect();
        format!("<{}: {}>", self.name, rendered.join(", "))
    }
}

/// One-shot builder producing a `Schema`.
///
/// ```text
/// static SCHEMA: Lazy<Schema<Author>> = Lazy::new(|| {
///     SchemaBuilder::<Author>::model("Author")
///         .attribute("name", Plain::new(String::new()), |a| &a.name, |a| &mut a.name)
///         .build()
/// });
/// ```
pub struct SchemaBuilder<M> {
    name: &'static str,
    plural_override: Option<String>,
    attributes: Vec<Entry<M>>,
}

impl<M: 'static> SchemaBuilder<M> {
    /// Starts an empty mapping for a plain mappable type.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            plural_override: None,
            attributes: Vec::new(),
        }
    }

    /// Starts from a copy of `parent`'s mapping, re-bound through the parent
    /// value embedded in `M`. An explicit plural on the parent carries over.
    pub fn extend<P: 'static>(
        name: &'static str,
        parent: &Schema<P>,
        project: fn(&M) -> &P,
        project_mut: fn(&mut M) -> &mut P,
    ) -> Self {
        let attributes = parent
            .attributes
            .iter()
            .map(|(attr_name, binding)| {
                let inherited: Arc<dyn Binding<M>> = Arc::new(Inherited {
                    parent: Arc::clone(binding),
                    project,
                    project_mut,
                });
                (*attr_name, inherited)
            })
            .collect();

        Self {
            name,
            plural_override: parent.plural_override.clone(),
            attributes,
        }
    }

    /// Registers `codec` under `name`, replacing an inherited or earlier entry
    /// of the same name in place.
    pub fn attribute<C: Codec>(
        mut self,
        name: &'static str,
        codec: C,
        get: fn(&M) -> &C::Value,
        get_mut: fn(&mut M) -> &mut C::Value,
    ) -> Self {
        let binding: Arc<dyn Binding<M>> = Arc::new(Field {
            codec,
            get,
            get_mut,
        });
        match self
            .attributes
            .iter_mut()
            .find(|(declared, _)| *declared == name)
        {
            Some(entry) => entry.1 = binding,
            None => self.attributes.push((name, binding)),
        }
        self
    }

    /// Overrides the derived table name.
    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural_override = Some(plural.into());
        self
    }

    pub fn build(self) -> Schema<M> {
        let plural = self
            .plural_override
            .clone()
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()));
        Schema {
            name: self.name,
            plural_override: self.plural_override,
            plural,
            attributes: self.attributes,
        }
    }
}

impl<M: Model> SchemaBuilder<M> {
    /// Starts a model mapping with the implicit `id` attribute.
    pub fn model(name: &'static str) -> Self {
        Self::new(name).attribute(
            "id",
            Plain::<Option<Key>>::new(None),
            |model| model.id(),
            |model| model.id_mut(),
        )
    }
}
