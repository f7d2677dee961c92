use crate::entity::Entity;

use keyper_core::Key;

use std::collections::BTreeMap;
use std::sync::Arc;

/// A pk-keyed sorted sequence of entity snapshots.
///
/// Exactly one entry per canonical pk; iteration is ascending by the key
/// comparator. Two usage modes mirror each other:
///
/// - snapshot mode: [`with`](Self::with) / [`without`](Self::without)
///   produce a new index and leave the receiver untouched. A collection's
///   primary index is only ever updated by replacing it with such a copy.
/// - working mode: [`add`](Self::add) / [`remove`](Self::remove) mutate in
///   place, for buckets and query-cache members maintained in lockstep with
///   the primary index inside the same locked section.
#[derive(Debug, Clone, Default)]
pub struct UniqueIndex {
    entries: BTreeMap<Key, Arc<Entity>>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Key) -> Option<&Arc<Entity>> {
        self.entries.get(key)
    }

    pub fn has(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities in ascending pk order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    /// A new index with `items` inserted at their sorted positions,
    /// replacing on pk collision.
    #[must_use]
    pub fn with(&self, items: impl IntoIterator<Item = Arc<Entity>>) -> Self {
        let mut copy = self.clone();
        copy.add_all(items);
        copy
    }

    /// A new index without the given pks.
    #[must_use]
    pub fn without<'a>(&self, keys: impl IntoIterator<Item = &'a Key>) -> Self {
        let mut copy = self.clone();
        for key in keys {
            copy.entries.remove(key);
        }
        copy
    }

    /// Inserts in place, replacing on pk collision.
    pub fn add(&mut self, item: Arc<Entity>) {
        self.entries.insert(item.key().clone(), item);
    }

    pub fn add_all(&mut self, items: impl IntoIterator<Item = Arc<Entity>>) {
        for item in items {
            self.add(item);
        }
    }

    /// Removes in place.
    pub fn remove(&mut self, key: &Key) -> Option<Arc<Entity>> {
        self.entries.remove(key)
    }

    /// An independent copy.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }
}

impl FromIterator<Arc<Entity>> for UniqueIndex {
    fn from_iter<T: IntoIterator<Item = Arc<Entity>>>(iter: T) -> Self {
        let mut index = Self::new();
        index.add_all(iter);
        index
    }
}

impl<'a> IntoIterator for &'a UniqueIndex {
    type Item = &'a Arc<Entity>;
    type IntoIter = std::collections::btree_map::Values<'a, Key, Arc<Entity>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
