//! Scoped persistence operations for model types.
//!
//! # Responsibility
//! - Save instances as insert (no id) or upsert (id present).
//! - Resolve keys to shared instances through the active identity map.
//!
//! # Invariants
//! - Within one scope frame a (type, key) pair maps to one live instance.
//! - Single-key `get` fails with `NotFound`; batch `get_many` yields `None`
//!   for missing keys and never fails the whole batch for a miss.
//! - `save` never touches the identity map.

use crate::db::{ConflictPolicy, InsertResult};
use crate::model::error::{ModelError, ModelResult};
use crate::model::key::{Document, Key};
use crate::model::mappable::Mappable;
use crate::scope::{Handle, ScopeStack};
use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A mappable type persisted in its own table and addressed by `id`.
pub trait Model: Mappable {
    fn id(&self) -> &Option<Key>;
    fn id_mut(&mut self) -> &mut Option<Key>;

    /// Table this type is stored in.
    fn table() -> &'static str {
        Self::schema().plural()
    }

    /// Writes this instance through the active scope's connection.
    ///
    /// Without an id the document is inserted and the generated key is
    /// assigned back to `id`. With an id it is upserted (merge on conflict).
    fn save(&mut self, scope: &mut ScopeStack) -> ModelResult<InsertResult> {
        let document = self.to_document()?;
        let (result, generated) = write_document::<Self>(scope, document)?;
        if let Some(key) = generated {
            *self.id_mut() = Some(key);
        }
        Ok(result)
    }

    /// `save` for a shared instance, such as one handed out by `get`.
    ///
    /// The document is encoded under a shared borrow, so the instance may
    /// reference itself. The handle is borrowed mutably only to assign a
    /// generated key.
    fn save_handle(handle: &Handle<Self>, scope: &mut ScopeStack) -> ModelResult<InsertResult> {
        let document = handle.borrow().to_document()?;
        let (result, generated) = write_document::<Self>(scope, document)?;
        if let Some(key) = generated {
            *handle.borrow_mut().id_mut() = Some(key);
        }
        Ok(result)
    }

    /// Returns the instance stored under `key`, cached per scope frame.
    fn get(scope: &mut ScopeStack, key: impl Into<Key>) -> ModelResult<Handle<Self>> {
        let key = key.into();
        let table = Self::table();

        if let Some(cached) = scope.identity_map()?.get::<Self>(&key) {
            debug!("event=model_get module=model status=cache_hit table={table} key={key}");
            return Ok(cached);
        }

        debug!("event=model_get module=model status=fetch table={table} key={key}");
        let document = scope
            .connection()?
            .get(table, &key)?
            .ok_or_else(|| ModelError::NotFound {
                table: table.to_string(),
                key: key.clone(),
            })?;
        materialize(scope, key, &document)
    }

    /// `get` addressed by key parts; several parts form a compound key.
    fn get_compound(
        scope: &mut ScopeStack,
        parts: impl IntoIterator<Item = Key>,
    ) -> ModelResult<Handle<Self>> {
        let key = Key::from_parts(parts).ok_or_else(|| ModelError::InvalidValue {
            attribute: "id".to_string(),
            message: "compound key needs at least one part".to_string(),
        })?;
        Self::get(scope, key)
    }

    /// Resolves many keys with at most one batch fetch.
    ///
    /// Cached keys are served from the identity map; the rest are fetched
    /// together and registered under the `id` of each returned document. The
    /// returned iterator follows the order of `keys`.
    fn get_many(
        scope: &mut ScopeStack,
        keys: impl IntoIterator<Item = Key>,
    ) -> ModelResult<Batch<Self>> {
        let keys: Vec<Key> = keys.into_iter().collect();
        let table = Self::table();
        let identity_map = scope.identity_map()?;

        let mut resolved: HashMap<Key, Handle<Self>> = HashMap::new();
        let mut pending: HashSet<Key> = HashSet::new();
        let mut to_fetch: Vec<Key> = Vec::new();
        for key in &keys {
            if resolved.contains_key(key) || pending.contains(key) {
                continue;
            }
            match identity_map.get::<Self>(key) {
                Some(cached) => {
                    resolved.insert(key.clone(), cached);
                }
                None => {
                    pending.insert(key.clone());
                    to_fetch.push(key.clone());
                }
            }
        }

        debug!(
            "event=model_get_many module=model status=start table={table} requested={} cached={} fetch={}",
            keys.len(),
            resolved.len(),
            to_fetch.len()
        );

        if !to_fetch.is_empty() {
            let documents = scope.connection()?.get_many(table, &to_fetch)?;
            for document in documents {
                let key = document
                    .get("id")
                    .and_then(Key::from_value)
                    .ok_or_else(|| ModelError::MissingKey {
                        table: table.to_string(),
                    })?;
                // An earlier document of this batch may already have pulled
                // this one in through a reference.
                let handle = match scope.identity_map()?.get::<Self>(&key) {
                    Some(existing) => existing,
                    None => materialize(scope, key.clone(), &document)?,
                };
                resolved.insert(key, handle);
            }
        }

        Ok(Batch {
            keys: keys.into_iter(),
            resolved,
        })
    }
}

/// Inserts or upserts `document` into `M`'s table.
///
/// Returns the write outcome and, for an insert, the generated key.
fn write_document<M: Model>(
    scope: &mut ScopeStack,
    mut document: Document,
) -> ModelResult<(InsertResult, Option<Key>)> {
    let table = M::table();
    let connection = scope.connection_mut()?;

    if document.get("id").and_then(Key::from_value).is_some() {
        debug!("event=model_save module=model status=upsert table={table}");
        let result = connection.insert(table, document, ConflictPolicy::Update)?;
        return Ok((result, None));
    }

    document.remove("id");
    let result = connection.insert(table, document, ConflictPolicy::Error)?;
    let key = result
        .generated_keys
        .first()
        .cloned()
        .ok_or_else(|| ModelError::MissingKey {
            table: table.to_string(),
        })?;
    debug!("event=model_save module=model status=insert table={table} key={key}");
    Ok((result, Some(key)))
}

/// Decodes `document` into a new instance registered under `key`.
///
/// The handle is registered before its attributes are decoded, so references
/// that lead back to it resolve to the same instance. On failure every
/// instance registered while decoding is dropped from the identity map, since
/// finished ones may hold references to the failed instance.
fn materialize<M: Model>(
    scope: &mut ScopeStack,
    key: Key,
    document: &Document,
) -> ModelResult<Handle<M>> {
    let handle = Rc::new(RefCell::new(M::with_defaults()));
    let identity_map = scope.identity_map_mut()?;
    let checkpoint = identity_map.checkpoint();
    identity_map.insert::<M>(key, Rc::clone(&handle));

    let loaded = handle.borrow_mut().load_document(document, scope);
    if let Err(err) = loaded {
        if let Ok(identity_map) = scope.identity_map_mut() {
            identity_map.rollback(checkpoint);
        }
        return Err(err);
    }

    Ok(handle)
}

/// Lazily yields `get_many` results in request order.
pub struct Batch<M> {
    keys: std::vec::IntoIter<Key>,
    resolved: HashMap<Key, Handle<M>>,
}

impl<M> Iterator for Batch<M> {
    type Item = Option<Handle<M>>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(self.resolved.get(&key).cloned())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl<M> ExactSizeIterator for Batch<M> {}
