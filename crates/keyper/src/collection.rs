mod config;
pub use config::{CollectionConfig, CollectionDefaults, Transform};

mod fetch;
pub use fetch::FetchOptions;

mod mutate;

pub(crate) mod relations;
pub(crate) use relations::BackRef;
pub use relations::{Related, RelationConfig, RelationMask};

use crate::db::DbShared;
use crate::entity::Entity;
use crate::index::{NonUniqueIndex, UniqueIndex};
use crate::signal::Signal;

use keyper_core::query::{Criteria, FetchParams};
use keyper_core::{DataSource, Error, Key, Result, Value, ValueRecord};

use futures::future::{BoxFuture, Shared};
use indexmap::IndexMap;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

/// Payload of the `inserted` signal.
#[derive(Debug, Clone)]
pub struct Inserted {
    pub entity: Arc<Entity>,
    /// The replaced snapshot, when the insert replaced one.
    pub previous: Option<Arc<Entity>>,
}

/// A result set annotated with the full-match total ignoring paging.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    pub items: Vec<Arc<Entity>>,
    pub total: u64,
}

/// In-flight single-item fetch, shared by every caller that coalesced onto
/// it. Resolves to completion only; callers re-read the index afterwards.
pub(crate) type ItemFuture = Shared<BoxFuture<'static, Result<(), Error>>>;

/// In-flight query fetch; resolves to the fetched pk set so joined callers
/// can map it through the index current at their resumption.
pub(crate) type QueryFuture = Shared<BoxFuture<'static, Result<FetchOutcome, Error>>>;

#[derive(Debug, Clone)]
pub(crate) struct FetchOutcome {
    pub(crate) keys: Vec<Key>,
    pub(crate) total: Option<u64>,
}

/// A named set of cached entities with a data source and a relation graph.
///
/// Cloning is shallow; all clones observe the same cache.
pub struct Collection {
    pub(crate) shared: Arc<CollectionShared>,
}

impl Clone for Collection {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct CollectionShared {
    pub(crate) name: String,
    pub(crate) db: Weak<DbShared>,
    pub(crate) source: Arc<dyn DataSource>,
    pub(crate) config: CollectionConfig,
    pub(crate) links: Mutex<Links>,
    pub(crate) state: Mutex<State>,
    pub(crate) inserted: Signal<Inserted>,
    pub(crate) removed: Signal<Arc<Entity>>,
}

/// Relation wiring. Fixed after the collection (and any deferred relation
/// target) is created; kept separate from `State` so accessors never contend
/// with cache mutation.
#[derive(Default)]
pub(crate) struct Links {
    pub(crate) relations: IndexMap<String, RelationConfig>,
    pub(crate) back_refs: IndexMap<String, BackRef>,
    pub(crate) foreign_keys: HashMap<String, String>,
    pub(crate) children: Vec<String>,
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) index: UniqueIndex,
    pub(crate) indexes: HashMap<String, NonUniqueIndex>,
    pub(crate) queries: HashMap<String, CachedQuery>,
    pub(crate) pending: HashMap<String, QueryFuture>,
    pub(crate) pending_items: HashMap<Key, ItemFuture>,
}

pub(crate) struct CachedQuery {
    pub(crate) filter: Criteria,
    pub(crate) items: UniqueIndex,
}

pub(crate) fn new_collection(
    db: Weak<DbShared>,
    name: String,
    config: CollectionConfig,
) -> Result<Collection> {
    if config.primary_key.is_empty() {
        return Err(Error::invalid_config(format!(
            "collection `{name}` must name at least one primary key field"
        )));
    }
    if let Some(parent) = &config.parent {
        if !config.relations.contains_key(parent) {
            return Err(Error::invalid_config(format!(
                "collection `{name}` declares parent `{parent}` without a matching relation"
            )));
        }
    }

    let links = Links {
        relations: config.relations.clone(),
        ..Links::default()
    };

    Ok(Collection {
        shared: Arc::new(CollectionShared {
            name,
            db,
            source: config.source.clone(),
            config,
            links: Mutex::new(links),
            state: Mutex::new(State::default()),
            inserted: Signal::new(),
            removed: Signal::new(),
        }),
    })
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The owning registry, while it is alive.
    pub fn db(&self) -> Option<crate::db::Db> {
        self.shared.db.upgrade().map(crate::db::Db::from_shared)
    }

    /// Fires on every cache insert, synchronously, before the inserting
    /// caller resumes.
    pub fn inserted(&self) -> &Signal<Inserted> {
        &self.shared.inserted
    }

    /// Fires on every notifying cache removal.
    pub fn removed(&self) -> &Signal<Arc<Entity>> {
        &self.shared.removed
    }

    /// The cached snapshot for `key`, if present.
    pub fn cached(&self, key: &Key) -> Option<Arc<Entity>> {
        self.shared.state.lock().unwrap().index.get(key).cloned()
    }

    /// The cached snapshot for `key`; errors when absent.
    pub fn get(&self, key: &Key) -> Result<Arc<Entity>> {
        self.cached(key).ok_or_else(|| {
            Error::record_not_found(format!("collection={} key={key}", self.shared.name))
        })
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A point-in-time copy of the primary index.
    pub fn snapshot(&self) -> UniqueIndex {
        self.shared.state.lock().unwrap().index.copy()
    }

    /// Ingress path for every record: fetch results, create/update responses,
    /// and user payloads. Detaches and cascades embedded relation records,
    /// then atomically replaces the cached snapshot, its secondary-index
    /// entries, and the matching cached queries.
    ///
    /// Inserting a payload structurally equal to the cached snapshot returns
    /// the cached `Arc` unchanged and fires nothing.
    pub fn insert(&self, raw: ValueRecord) -> Result<Arc<Entity>> {
        let raw = match &self.shared.config.before_insert {
            Some(transform) => transform(raw),
            None => raw,
        };
        let key = self.primary_key_of(&raw)?;

        // Embedded records are detached and recursively inserted into their
        // collections before this collection's state lock is taken, so the
        // cascade can reach back into `self` (self-relations) or fan out to
        // other collections freely.
        let (relations, back_refs) = {
            let links = self.shared.links.lock().unwrap();
            (links.relations.clone(), links.back_refs.clone())
        };
        let raw = self.detach_embedded_relations(raw, &relations)?;
        let raw = self.cascade_embedded_back_refs(raw, &back_refs, &key)?;

        let entity = Entity::new(self.shared.name.clone(), key.clone(), raw);
        let (entity, previous) = {
            let mut state = self.shared.state.lock().unwrap();

            if let Some(previous) = state.index.get(&key) {
                if previous.fields() == entity.fields() {
                    return Ok(previous.clone());
                }
            }

            let previous = state.index.get(&key).cloned();
            if let Some(previous) = &previous {
                // Silent removal: the replacement is announced as one
                // `inserted(new, previous)` event.
                Self::remove_from_state(&mut state, previous);
            }

            let entity = Arc::new(entity);
            state.index = state.index.with([entity.clone()]);
            for (field, index) in state.indexes.iter_mut() {
                if let Some(value) = entity.get(field) {
                    index.insert(value, entity.clone());
                }
            }
            for cached in state.queries.values_mut() {
                if cached.filter.matches_record(entity.fields()) {
                    cached.items.add(entity.clone());
                }
            }

            (entity, previous)
        };

        tracing::trace!(collection = %self.shared.name, key = %entity.key(), "inserted");
        self.shared.inserted.emit(&Inserted {
            entity: entity.clone(),
            previous,
        });
        Ok(entity)
    }

    /// Removes the cached snapshot for `key` and fires `removed`.
    pub fn remove(&self, key: &Key) -> Option<Arc<Entity>> {
        let removed = {
            let mut state = self.shared.state.lock().unwrap();
            let entity = state.index.get(key).cloned()?;
            Self::remove_from_state(&mut state, &entity);
            entity
        };
        self.shared.removed.emit(&removed);
        Some(removed)
    }

    fn remove_from_state(state: &mut State, entity: &Arc<Entity>) {
        state.index = state.index.without([entity.key()]);
        let State {
            indexes, queries, ..
        } = state;
        for (field, index) in indexes.iter_mut() {
            if let Some(value) = entity.get(field) {
                index.remove(value, entity.key());
            }
        }
        // A query that contained this pk is no longer trustworthy.
        queries.retain(|_, cached| !cached.items.has(entity.key()));
    }

    /// Evaluates `params` against the cache only.
    ///
    /// Candidate selection exploits at most one secondary index: among the
    /// indexed fields the filter constrains with a bare equality, the
    /// smallest bucket wins; an indexed term with no bucket short-circuits
    /// to an empty result. `offset`/`limit` require an ordering.
    pub fn filter(&self, params: &FetchParams) -> Result<Slice> {
        if (params.limit.is_some() || params.offset.is_some()) && params.order_by.is_none() {
            return Err(Error::invalid_query("offset/limit require an ordering"));
        }

        let mut items: Vec<Arc<Entity>> = {
            let state = self.shared.state.lock().unwrap();

            let mut candidates: Option<&UniqueIndex> = None;
            for (field, index) in &state.indexes {
                let Some(operand) = params.filter.equality_operand(field) else {
                    continue;
                };
                match index.bucket(operand) {
                    None => return Ok(Slice::default()),
                    Some(bucket) => {
                        if candidates.map_or(true, |current| bucket.len() < current.len()) {
                            candidates = Some(bucket);
                        }
                    }
                }
            }

            candidates
                .unwrap_or(&state.index)
                .iter()
                .filter(|entity| params.filter.matches_record(entity.fields()))
                .cloned()
                .collect()
        };

        if let Some(order_by) = &params.order_by {
            items.sort_by(|a, b| order_by.compare_records(a.fields(), b.fields()));
        }
        let total = items.len() as u64;

        if let Some(offset) = params.offset {
            let offset = (offset as usize).min(items.len());
            items.drain(..offset);
        }
        if let Some(limit) = params.limit {
            items.truncate(limit as usize);
        }

        Ok(Slice { items, total })
    }

    /// Derives the primary key from a payload. Every configured component
    /// must be present and keyable.
    pub(crate) fn primary_key_of(&self, record: &ValueRecord) -> Result<Key> {
        let fields = &self.shared.config.primary_key;
        let mut parts = Vec::with_capacity(fields.len());
        for field in fields {
            let value = record.get(field).filter(|v| !v.is_null()).ok_or_else(|| {
                Error::invalid_key(format!(
                    "collection `{}` payload is missing primary key field `{field}`",
                    self.shared.name
                ))
            })?;
            parts.push(Key::from_value(value)?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap())
        } else {
            Key::composite(parts)
        }
    }

    /// Resolves a collection by name through the owning registry. A
    /// collection may name itself.
    pub(crate) fn related_collection(&self, name: &str) -> Result<Collection> {
        if name == self.shared.name {
            return Ok(self.clone());
        }
        let db = self
            .shared
            .db
            .upgrade()
            .ok_or_else(|| Error::invalid_config("database registry dropped"))?;
        db.collection(name)
            .ok_or_else(|| Error::invalid_config(format!("unknown collection `{name}`")))
    }

    pub(crate) fn bucket_members(&self, field: &str, value: &Value) -> Vec<Arc<Entity>> {
        let state = self.shared.state.lock().unwrap();
        state
            .indexes
            .get(field)
            .and_then(|index| index.bucket(value))
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn bucket_snapshot(&self, field: &str, value: &Value) -> UniqueIndex {
        let state = self.shared.state.lock().unwrap();
        state
            .indexes
            .get(field)
            .and_then(|index| index.bucket(value))
            .map(UniqueIndex::copy)
            .unwrap_or_default()
    }

    /// Detach embedded forward-relation records and insert them into their
    /// collections; backfill the foreign key from the inserted pk when the
    /// payload did not carry it.
    fn detach_embedded_relations(
        &self,
        mut raw: ValueRecord,
        relations: &IndexMap<String, RelationConfig>,
    ) -> Result<ValueRecord> {
        for (field, relation) in relations {
            let Some(fk_field) = relation.foreign_key.as_deref() else {
                continue;
            };
            if relation.many {
                let embedded = matches!(
                    raw.get(field),
                    Some(Value::List(items)) if !items.is_empty() && items.iter().all(Value::is_record)
                );
                if !embedded {
                    continue;
                }
                let Some(Value::List(items)) = raw.remove(field) else {
                    unreachable!()
                };
                let related = self.related_collection(&relation.collection)?;
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    let Value::Record(record) = item else {
                        unreachable!()
                    };
                    keys.push(related.insert(record)?.key().to_value());
                }
                if raw.get(fk_field).is_none() {
                    raw.insert(fk_field, Value::List(keys));
                }
            } else if matches!(raw.get(field), Some(Value::Record(_))) {
                let Some(Value::Record(nested)) = raw.remove(field) else {
                    unreachable!()
                };
                let related = self.related_collection(&relation.collection)?;
                let entity = related.insert(nested)?;
                if raw.get(fk_field).is_none() {
                    raw.insert(fk_field, entity.key().to_value());
                }
            }
        }
        Ok(raw)
    }

    /// Insert embedded back-reference arrays into the declaring collection
    /// and cascade-remove previous members missing from the new array.
    fn cascade_embedded_back_refs(
        &self,
        mut raw: ValueRecord,
        back_refs: &IndexMap<String, BackRef>,
        key: &Key,
    ) -> Result<ValueRecord> {
        for (name, back_ref) in back_refs {
            if !matches!(raw.get(name), Some(Value::List(_))) {
                continue;
            }
            let Some(Value::List(items)) = raw.remove(name) else {
                unreachable!()
            };
            let declaring = self.related_collection(&back_ref.collection)?;
            let previous = declaring.bucket_members(&back_ref.foreign_key, &key.to_value());

            let mut membership = HashSet::with_capacity(items.len());
            for item in items {
                let Value::Record(mut record) = item else {
                    continue;
                };
                record.insert(back_ref.foreign_key.clone(), key.to_value());
                membership.insert(declaring.insert(record)?.key().clone());
            }

            for member in previous {
                if !membership.contains(member.key()) {
                    declaring.remove(member.key());
                }
            }
        }
        Ok(raw)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("Collection")
            .field("name", &self.shared.name)
            .field("cached", &state.index.len())
            .field("queries", &state.queries.len())
            .finish()
    }
}
