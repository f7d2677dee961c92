use crate::collection::RelationMask;

use keyper_core::{Key, Value, ValueRecord};

/// An immutable cached entity snapshot.
///
/// Snapshots are shared as `Arc<Entity>`; the cache never exposes a mutable
/// alias, and replacement happens by swapping whole snapshots inside the
/// owning collection. The collection name tags every entity so the database
/// can resolve the owning collection from any entity reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    collection: String,
    key: Key,
    fields: ValueRecord,
}

impl Entity {
    pub(crate) fn new(collection: impl Into<String>, key: Key, fields: ValueRecord) -> Self {
        Self {
            collection: collection.into(),
            key,
            fields,
        }
    }

    /// The name of the owning collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn fields(&self) -> &ValueRecord {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A mutable working copy of a cached entity.
///
/// Produced by [`Collection::get_mutable`](crate::Collection::get_mutable)
/// (or built from scratch for [`commit`](crate::Collection::commit)).
/// Requested back-reference buckets are materialized inline as lists of
/// records; the relation mask the copy was created with travels along so an
/// in-place update can rebuild the same shape.
#[derive(Debug, Clone)]
pub struct MutableEntity {
    collection: String,
    key: Option<Key>,
    fields: ValueRecord,
    mask: Option<RelationMask>,
}

impl MutableEntity {
    pub(crate) fn new(
        collection: String,
        key: Option<Key>,
        fields: ValueRecord,
        mask: Option<RelationMask>,
    ) -> Self {
        Self {
            collection,
            key,
            fields,
            mask,
        }
    }

    /// A fresh, not-yet-persisted entity.
    pub fn draft(collection: impl Into<String>, fields: ValueRecord) -> Self {
        Self::new(collection.into(), None, fields, None)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn fields(&self) -> &ValueRecord {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut ValueRecord {
        &mut self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field, value);
    }

    pub(crate) fn mask(&self) -> Option<&RelationMask> {
        self.mask.as_ref()
    }

    pub(crate) fn replace_fields(&mut self, fields: ValueRecord, key: Key) {
        self.fields = fields;
        self.key = Some(key);
    }
}
