use crate::collection::{self, Collection, CollectionConfig, CollectionDefaults};
use crate::entity::Entity;
use crate::signal::Signal;

use keyper_core::{Error, Result};

use indexmap::IndexMap;

use std::sync::{Arc, Mutex};

/// The collection registry.
///
/// Collections hold only a weak handle back to the registry and resolve
/// relation targets by name at access time, so cyclic and self-referential
/// collection graphs need no special casing. Relations declared before
/// their target exists are wired when it appears.
pub struct Db {
    shared: Arc<DbShared>,
}

impl Clone for Db {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct DbShared {
    collections: Mutex<IndexMap<String, Collection>>,
    deferred: Mutex<Vec<DeferredRelation>>,
    defaults: CollectionDefaults,
    collection_created: Signal<Collection>,
}

/// A relation whose target collection did not exist at declaration time.
struct DeferredRelation {
    declaring: String,
    field: String,
    target: String,
}

impl Db {
    pub fn new() -> Self {
        Self::with_defaults(CollectionDefaults::default())
    }

    /// A registry whose defaults merge under every collection's own
    /// configuration.
    pub fn with_defaults(defaults: CollectionDefaults) -> Self {
        Self {
            shared: Arc::new(DbShared {
                collections: Mutex::new(IndexMap::new()),
                deferred: Mutex::new(Vec::new()),
                defaults,
                collection_created: Signal::new(),
            }),
        }
    }

    /// Creates and registers a collection, wiring its relations.
    ///
    /// Relations whose target collection does not exist yet are deferred
    /// and wired from the target's own `create_collection` call — a
    /// deferred configuration error therefore surfaces there.
    pub fn create_collection(
        &self,
        name: impl Into<String>,
        config: CollectionConfig,
    ) -> Result<Collection> {
        let name = name.into();
        let config = config.merge_defaults(&self.shared.defaults);

        let collection = {
            let mut collections = self.shared.collections.lock().unwrap();
            if collections.contains_key(&name) {
                return Err(Error::invalid_config(format!(
                    "collection `{name}` already exists"
                )));
            }
            let collection =
                collection::new_collection(Arc::downgrade(&self.shared), name.clone(), config)?;
            collections.insert(name.clone(), collection.clone());
            collection
        };

        let relation_targets: Vec<(String, String)> = collection
            .shared
            .config
            .relations
            .iter()
            .map(|(field, relation)| (field.clone(), relation.collection.clone()))
            .collect();
        for (field, target) in relation_targets {
            if !collection::relations::wire_relation(self, &collection, &field)? {
                tracing::debug!(
                    collection = %name,
                    relation = %field,
                    target = %target,
                    "deferring relation wiring until the target exists"
                );
                self.shared.deferred.lock().unwrap().push(DeferredRelation {
                    declaring: name.clone(),
                    field,
                    target,
                });
            }
        }

        self.shared.collection_created.emit(&collection);

        // Wire any relation that was waiting for this collection.
        let ready: Vec<DeferredRelation> = {
            let mut deferred = self.shared.deferred.lock().unwrap();
            let (ready, waiting) = deferred
                .drain(..)
                .partition(|relation| relation.target == name);
            *deferred = waiting;
            ready
        };
        for relation in ready {
            if let Some(declaring) = self.collection(&relation.declaring) {
                collection::relations::wire_relation(self, &declaring, &relation.field)?;
            }
        }

        Ok(collection)
    }

    pub fn collection(&self, name: &str) -> Option<Collection> {
        self.shared.collection(name)
    }

    /// Resolves the owning collection of any entity reference.
    pub fn collection_of(&self, entity: &Entity) -> Option<Collection> {
        self.collection(entity.collection())
    }

    /// Fires whenever a collection is registered.
    pub fn collection_created(&self) -> &Signal<Collection> {
        &self.shared.collection_created
    }

    pub(crate) fn from_shared(shared: Arc<DbShared>) -> Self {
        Self { shared }
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl DbShared {
    pub(crate) fn collection(&self, name: &str) -> Option<Collection> {
        self.collections.lock().unwrap().get(name).cloned()
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self.shared.collections.lock().unwrap();
        f.debug_struct("Db")
            .field("collections", &collections.keys().collect::<Vec<_>>())
            .finish()
    }
}
