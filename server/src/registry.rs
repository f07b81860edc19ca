//! Thread-safe id-keyed registries and the id allocator
//!
//! Registries are explicitly constructed and handed to whoever needs them
//! (usually behind an `Arc`); there is no global instance. Callers never get
//! a reference into the map: lookups and listings return copies, and
//! mutation happens inside a closure while the lock is held.

use parking_lot::RwLock;
use shared::EntityId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Ids are never reused, so this means the allocator or a caller is broken.
    #[error("id {0} is already registered")]
    Duplicate(EntityId),
}

/// Concurrent map from id to value.
#[derive(Debug)]
pub struct Registry<V> {
    entries: RwLock<BTreeMap<EntityId, V>>,
}

impl<V: Clone> Registry<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adds a new entry. Fails without touching the existing entry if `id` is taken.
    pub fn insert(&self, id: EntityId, value: V) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        entries.insert(id, value);
        Ok(())
    }

    pub fn remove(&self, id: EntityId) -> Option<V> {
        self.entries.write().remove(&id)
    }

    /// Returns a copy of the entry, or `None` if it is not (or no longer) registered.
    pub fn get(&self, id: EntityId) -> Option<V> {
        self.entries.read().get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Runs `f` on the entry under the write lock.
    ///
    /// `f` must not block or call back into this registry.
    pub fn update<R>(&self, id: EntityId, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.entries.write().get_mut(&id).map(f)
    }

    /// Copies every entry out, ordered by id.
    pub fn snapshot(&self) -> Vec<V> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V: Clone> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out strictly increasing ids starting at 1.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> EntityId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
