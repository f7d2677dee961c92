use super::UniqueIndex;
use crate::entity::Entity;

use keyper_core::{Key, Value};

use std::collections::HashMap;
use std::sync::Arc;

/// A secondary index: foreign-key value → the entities sharing it.
///
/// Buckets are keyed by the canonical string form of the foreign-key value
/// (the same form primary keys canonicalize through, so a numeric fk and its
/// text rendering land in one bucket). Empty buckets are pruned.
#[derive(Debug, Clone, Default)]
pub struct NonUniqueIndex {
    buckets: HashMap<String, UniqueIndex>,
}

impl NonUniqueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, value: &Value) -> Option<&UniqueIndex> {
        self.buckets.get(&bucket_key(value))
    }

    pub fn insert(&mut self, value: &Value, entity: Arc<Entity>) {
        self.buckets.entry(bucket_key(value)).or_default().add(entity);
    }

    pub fn remove(&mut self, value: &Value, key: &Key) {
        let slot = bucket_key(value);
        if let Some(bucket) = self.buckets.get_mut(&slot) {
            bucket.remove(key);
            if bucket.is_empty() {
                self.buckets.remove(&slot);
            }
        }
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

fn bucket_key(value: &Value) -> String {
    match Key::from_value(value) {
        Ok(key) => key.canonical(),
        Err(_) => value.fingerprint(),
    }
}
