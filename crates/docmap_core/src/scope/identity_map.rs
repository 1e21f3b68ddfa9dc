//! Per-frame identity map: one live instance per (model type, key).

use crate::model::key::Key;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared, mutable instance handed out by the identity map.
pub type Handle<M> = Rc<RefCell<M>>;

trait Slot {
    fn len(&self) -> usize;
    fn discard(&mut self, key: &Key);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypeEntries<M>(HashMap<Key, Handle<M>>);

impl<M: 'static> Slot for TypeEntries<M> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn discard(&mut self, key: &Key) {
        self.0.remove(key);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Instances loaded in one scope frame, partitioned by concrete type.
///
/// Registrations are journaled so a failed load can drop every instance it
/// registered, not only the one it started from.
#[derive(Default)]
pub struct IdentityMap {
    by_type: HashMap<TypeId, Box<dyn Slot>>,
    journal: Vec<(TypeId, Key)>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<M: 'static>(&self, key: &Key) -> Option<Handle<M>> {
        self.entries::<M>()
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    pub fn contains<M: 'static>(&self, key: &Key) -> bool {
        self.entries::<M>()
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Registers `handle` under `key`, returning the handle it replaced.
    pub fn insert<M: 'static>(&mut self, key: Key, handle: Handle<M>) -> Option<Handle<M>> {
        self.journal.push((TypeId::of::<M>(), key.clone()));
        self.entries_mut::<M>().insert(key, handle)
    }

    pub fn remove<M: 'static>(&mut self, key: &Key) -> Option<Handle<M>> {
        self.entries_mut::<M>().remove(key)
    }

    /// Number of cached instances of type `M`.
    pub fn count<M: 'static>(&self) -> usize {
        self.entries::<M>().map_or(0, HashMap::len)
    }

    /// Number of cached instances across all types.
    pub fn len(&self) -> usize {
        self.by_type.values().map(|slot| slot.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position in the registration journal, for a later `rollback`.
    pub(crate) fn checkpoint(&self) -> usize {
        self.journal.len()
    }

    /// Drops every entry registered after `checkpoint`.
    pub(crate) fn rollback(&mut self, checkpoint: usize) {
        if checkpoint >= self.journal.len() {
            return;
        }
        for (type_id, key) in self.journal.drain(checkpoint..).rev() {
            if let Some(slot) = self.by_type.get_mut(&type_id) {
                slot.discard(&key);
            }
        }
    }

    fn entries<M: 'static>(&self) -> Option<&HashMap<Key, Handle<M>>> {
        self.by_type
            .get(&TypeId::of::<M>())
            .and_then(|slot| slot.as_any().downcast_ref::<TypeEntries<M>>())
            .map(|typed| &typed.0)
    }

    fn entries_mut<M: 'static>(&mut self) -> &mut HashMap<Key, Handle<M>> {
        let slot = self
            .by_type
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(TypeEntries::<M>(HashMap::new())));
        match slot.as_any_mut().downcast_mut::<TypeEntries<M>>() {
            Some(typed) => &mut typed.0,
            None => unreachable!("identity map slots are keyed by their own TypeId"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IdentityMap;
    use crate::model::key::Key;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn entries_are_partitioned_by_type() {
        let mut map = IdentityMap::new();
        map.insert(Key::from("k"), Rc::new(RefCell::new(1_u8)));
        map.insert(Key::from("k"), Rc::new(RefCell::new("text")));

        assert_eq!(*map.get::<u8>(&Key::from("k")).unwrap().borrow(), 1);
        assert_eq!(*map.get::<&str>(&Key::from("k")).unwrap().borrow(), "text");
        assert!(map.get::<u16>(&Key::from("k")).is_none());
        assert_eq!(map.count::<u8>(), 1);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn get_returns_the_registered_handle() {
        let mut map = IdentityMap::new();
        let handle = Rc::new(RefCell::new(7_i32));
        map.insert(Key::Int(1), Rc::clone(&handle));

        let cached = map.get::<i32>(&Key::Int(1)).unwrap();
        assert!(Rc::ptr_eq(&cached, &handle));

        map.remove::<i32>(&Key::Int(1));
        assert!(!map.contains::<i32>(&Key::Int(1)));
        assert!(map.is_empty());
    }

    #[test]
    fn rollback_drops_entries_registered_after_checkpoint() {
        let mut map = IdentityMap::new();
        map.insert(Key::Int(1), Rc::new(RefCell::new(1_i32)));
        let checkpoint = map.checkpoint();
        map.insert(Key::Int(2), Rc::new(RefCell::new(2_i32)));
        map.insert(Key::from("k"), Rc::new(RefCell::new("text")));

        map.rollback(checkpoint);

        assert!(map.contains::<i32>(&Key::Int(1)));
        assert!(!map.contains::<i32>(&Key::Int(2)));
        assert_eq!(map.count::<&str>(), 0);
        assert_eq!(map.len(), 1);
    }
}
