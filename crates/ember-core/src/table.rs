use std::collections::HashMap;

use crate::object::ObjRef;
use crate::value::Value;

/// A mapping from interned string handles to values.
///
/// Used for globals, per-instance fields, and per-class method tables. Keys
/// are compared by handle identity, which equals content identity because
/// the heap interns every string.
#[derive(Debug, Default)]
pub struct Table {
    entries: HashMap<ObjRef, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns true when the key was not present before.
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        self.entries.insert(key, value).is_none()
    }

    pub fn get(&self, key: ObjRef) -> Option<Value> {
        self.entries.get(&key).copied()
    }

    /// Remove an entry. Returns true when it existed.
    pub fn delete(&mut self, key: ObjRef) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().map(|(&k, &v)| (k, v))
    }

    /// Copy every entry of `other` into this table, overwriting collisions.
    /// Inheritance copies superclass methods into the subclass with this.
    pub fn merge_from(&mut self, other: &Table) {
        for (key, value) in other.iter() {
            self.entries.insert(key, value);
        }
    }
}
