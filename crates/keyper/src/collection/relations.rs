use super::{Collection, FetchOptions, Links};
use crate::db::Db;
use crate::entity::Entity;
use crate::index::UniqueIndex;

use keyper_core::{err, Error, Key, Result, Value};

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;

use std::collections::HashSet;
use std::sync::Arc;

/// Configuration of one forward relation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationConfig {
    pub(crate) collection: String,
    pub(crate) many: bool,
    pub(crate) foreign_key: Option<String>,
    pub(crate) back_ref: Option<String>,
    pub(crate) eager_load: bool,
}

impl RelationConfig {
    /// A relation targeting the named collection.
    pub fn to(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// The foreign-key field holds a list of pks instead of one.
    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    /// Overrides the derived foreign-key field name.
    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.foreign_key = Some(field.into());
        self
    }

    /// Registers the inverse view on the target collection under `name`.
    pub fn back_ref(mut self, name: impl Into<String>) -> Self {
        self.back_ref = Some(name.into());
        self
    }

    /// Hydrate this relation on every fetch, without asking.
    pub fn eager_load(mut self) -> Self {
        self.eager_load = true;
        self
    }
}

/// The inverse of a forward relation, registered on the target collection:
/// which collection points here, and through which foreign-key field.
#[derive(Debug, Clone)]
pub(crate) struct BackRef {
    pub(crate) collection: String,
    pub(crate) foreign_key: String,
}

/// Which relations to hydrate, optionally recursing per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationMask {
    fields: IndexMap<String, RelationMask>,
}

impl RelationMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a relation field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.entry(name.into()).or_default();
        self
    }

    /// Requests a relation field with a nested mask applied to the related
    /// entities.
    pub fn nested(mut self, name: impl Into<String>, mask: RelationMask) -> Self {
        self.fields.insert(name.into(), mask);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &RelationMask)> {
        self.fields.iter()
    }

    pub(crate) fn merge_field(&mut self, name: &str) {
        self.fields.entry(name.to_string()).or_default();
    }
}

/// A resolved forward relation.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Arc<Entity>>),
    Many(Vec<Arc<Entity>>),
}

impl Related {
    #[track_caller]
    pub fn unwrap_one(self) -> Option<Arc<Entity>> {
        match self {
            Self::One(entity) => entity,
            Self::Many(_) => panic!("expected a single relation"),
        }
    }

    #[track_caller]
    pub fn unwrap_many(self) -> Vec<Arc<Entity>> {
        match self {
            Self::Many(entities) => entities,
            Self::One(_) => panic!("expected a many relation"),
        }
    }
}

/// Completes the wiring of `declaring`'s relation on `field`.
///
/// Returns `Ok(false)` when the target collection does not exist yet; the
/// registry defers the call until it appears.
pub(crate) fn wire_relation(db: &Db, declaring: &Collection, field: &str) -> Result<bool> {
    let relation = {
        let links = declaring.shared.links.lock().unwrap();
        links.relations.get(field).cloned()
    }
    .ok_or_else(|| {
        Error::invalid_config(format!(
            "collection `{}` has no relation `{field}`",
            declaring.name()
        ))
    })?;

    let Some(target) = db.collection(&relation.collection) else {
        return Ok(false);
    };

    // Derive the foreign key from the field and the target's single-field pk
    // when the config does not name one.
    let foreign_key = match relation.foreign_key.clone() {
        Some(field) => field,
        None => {
            let pk = &target.shared.config.primary_key;
            let [pk_field] = &pk[..] else {
                return Err(Error::invalid_config(format!(
                    "relation `{}.{field}` targets a compound key; an explicit foreign key is required",
                    declaring.name()
                )));
            };
            if relation.many {
                format!("{field}_{pk_field}s")
            } else {
                format!("{field}_{pk_field}")
            }
        }
    };

    {
        let mut links = declaring.shared.links.lock().unwrap();
        if let Some(relation) = links.relations.get_mut(field) {
            relation.foreign_key = Some(foreign_key.clone());
        }
        links.foreign_keys.insert(foreign_key.clone(), field.to_string());
    }

    if let Some(name) = &relation.back_ref {
        register_back_ref(declaring, &target, name, &foreign_key)?;
    }

    if declaring.shared.config.parent.as_deref() == Some(field) {
        adopt_child(declaring, &target);
    }

    Ok(true)
}

fn register_back_ref(
    declaring: &Collection,
    target: &Collection,
    name: &str,
    foreign_key: &str,
) -> Result<()> {
    let back_ref = BackRef {
        collection: declaring.name().to_string(),
        foreign_key: foreign_key.to_string(),
    };

    let install = |links: &mut Links| -> Result<()> {
        if links.relations.contains_key(name)
            || links.back_refs.contains_key(name)
            || target.shared.config.primary_key.iter().any(|f| f == name)
        {
            return Err(Error::invalid_config(format!(
                "back-reference `{}` clashes with an existing accessor on `{}`",
                name,
                target.name()
            )));
        }
        links.back_refs.insert(name.to_string(), back_ref);
        Ok(())
    };

    if Arc::ptr_eq(&declaring.shared, &target.shared) {
        install(&mut declaring.shared.links.lock().unwrap())?;
    } else {
        install(&mut target.shared.links.lock().unwrap())?;
    }

    // The declaring side maintains a secondary index on the foreign-key
    // field; backfill it from whatever is already cached.
    let mut state = declaring.shared.state.lock().unwrap();
    let super::State { index, indexes, .. } = &mut *state;
    let bucket_index = indexes.entry(foreign_key.to_string()).or_default();
    for entity in index.iter() {
        if let Some(value) = entity.get(foreign_key) {
            bucket_index.insert(value, entity.clone());
        }
    }

    Ok(())
}

fn adopt_child(declaring: &Collection, target: &Collection) {
    let child = declaring.name().to_string();
    if Arc::ptr_eq(&declaring.shared, &target.shared) {
        declaring.shared.links.lock().unwrap().children.push(child);
    } else {
        target.shared.links.lock().unwrap().children.push(child);
    }
}

impl Collection {
    /// Resolves a forward relation of `entity`.
    ///
    /// Relations never hold entity references: resolution goes through the
    /// related collection's current index, so the result always reflects the
    /// latest snapshots. A dangling foreign key is a `record not found`
    /// error wrapped with the field path.
    pub fn related(&self, entity: &Entity, field: &str) -> Result<Related> {
        let relation = {
            let links = self.shared.links.lock().unwrap();
            links.relations.get(field).cloned()
        }
        .ok_or_else(|| {
            Error::invalid_config(format!(
                "collection `{}` has no relation `{field}`",
                self.shared.name
            ))
        })?;
        let foreign_key = relation.foreign_key.as_deref().ok_or_else(|| {
            Error::invalid_config(format!(
                "relation `{}.{field}` is not wired yet",
                self.shared.name
            ))
        })?;
        let target = self.related_collection(&relation.collection)?;

        if relation.many {
            let mut related = Vec::new();
            match entity.get(foreign_key) {
                None | Some(Value::Null) => {}
                Some(Value::List(fks)) => {
                    for fk in fks {
                        related.push(self.resolve_fk(&target, fk, field)?);
                    }
                }
                Some(fk) => related.push(self.resolve_fk(&target, fk, field)?),
            }
            Ok(Related::Many(related))
        } else {
            match entity.get(foreign_key) {
                None | Some(Value::Null) => Ok(Related::One(None)),
                Some(fk) => Ok(Related::One(Some(self.resolve_fk(&target, fk, field)?))),
            }
        }
    }

    fn resolve_fk(&self, target: &Collection, fk: &Value, field: &str) -> Result<Arc<Entity>> {
        Key::from_value(fk)
            .and_then(|key| target.get(&key))
            .map_err(|e| e.context(err!("relation `{}.{field}`", self.shared.name)))
    }

    /// The back-reference bucket for `entity`: every cached entity of the
    /// declaring collection whose foreign key points at it. Empty when
    /// nothing does.
    pub fn back_refs(&self, entity: &Entity, name: &str) -> Result<UniqueIndex> {
        let back_ref = {
            let links = self.shared.links.lock().unwrap();
            links.back_refs.get(name).cloned()
        }
        .ok_or_else(|| {
            Error::invalid_config(format!(
                "collection `{}` has no back-reference `{name}`",
                self.shared.name
            ))
        })?;
        let declaring = self.related_collection(&back_ref.collection)?;
        Ok(declaring.bucket_snapshot(&back_ref.foreign_key, &entity.key().to_value()))
    }

    /// Names of collections that declared this one as their parent.
    pub fn child_collections(&self) -> Vec<String> {
        self.shared.links.lock().unwrap().children.clone()
    }

    /// Hydrates the relations named by `mask` for `items`.
    ///
    /// Foreign keys are grouped per related collection and deduplicated
    /// against what that collection already caches, so each target sees at
    /// most one batch load. Nested masks recurse over the gathered related
    /// entities once the batch completes. Back-reference fields are skipped;
    /// their members arrive through their own collection's fetches.
    pub fn load_relations<'a>(
        &'a self,
        items: &'a [Arc<Entity>],
        mask: &'a RelationMask,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if mask.is_empty() || items.is_empty() {
                return Ok(());
            }

            let (relations, back_refs) = {
                let links = self.shared.links.lock().unwrap();
                (links.relations.clone(), links.back_refs.clone())
            };

            let mut groups: IndexMap<String, Vec<Key>> = IndexMap::new();
            let mut nested: Vec<(String, RelationMask)> = Vec::new();

            for (field, submask) in mask.iter() {
                if back_refs.contains_key(field) {
                    continue;
                }
                let relation = relations.get(field).ok_or_else(|| {
                    Error::invalid_config(format!(
                        "collection `{}` has no relation `{field}`",
                        self.shared.name
                    ))
                })?;
                let foreign_key = relation.foreign_key.as_deref().ok_or_else(|| {
                    Error::invalid_config(format!(
                        "relation `{}.{field}` is not wired yet",
                        self.shared.name
                    ))
                })?;
                let target = self.related_collection(&relation.collection)?;

                let group = groups.entry(relation.collection.clone()).or_default();
                for item in items {
                    for fk in foreign_key_values(item, foreign_key, relation.many) {
                        let Ok(key) = Key::from_value(fk) else {
                            continue;
                        };
                        if target.cached(&key).is_none() {
                            group.push(key);
                        }
                    }
                }

                if !submask.is_empty() {
                    nested.push((field.clone(), submask.clone()));
                }
            }

            for (collection, keys) in groups {
                if keys.is_empty() {
                    continue;
                }
                let target = self.related_collection(&collection)?;
                tracing::debug!(
                    collection = %self.shared.name,
                    related = %collection,
                    keys = keys.len(),
                    "hydrating relations"
                );
                target.fetch_all(&keys, FetchOptions::default()).await?;
            }

            for (field, submask) in nested {
                let relation = relations.get(&field).unwrap();
                let foreign_key = relation.foreign_key.as_deref().unwrap();
                let target = self.related_collection(&relation.collection)?;

                let mut seen = HashSet::new();
                let mut gathered = Vec::new();
                for item in items {
                    for fk in foreign_key_values(item, foreign_key, relation.many) {
                        let Ok(key) = Key::from_value(fk) else {
                            continue;
                        };
                        if let Some(entity) = target.cached(&key) {
                            if seen.insert(key) {
                                gathered.push(entity);
                            }
                        }
                    }
                }
                target.load_relations(&gathered, &submask).await?;
            }

            Ok(())
        }
        .boxed()
    }

    /// The requested mask plus every eager-load relation.
    pub(crate) fn effective_mask(&self, requested: Option<&RelationMask>) -> RelationMask {
        let mut mask = requested.cloned().unwrap_or_default();
        let links = self.shared.links.lock().unwrap();
        for (field, relation) in &links.relations {
            if relation.eager_load {
                mask.merge_field(field);
            }
        }
        mask
    }
}

fn foreign_key_values<'a>(
    entity: &'a Entity,
    foreign_key: &str,
    many: bool,
) -> impl Iterator<Item = &'a Value> {
    let values: Vec<&Value> = match entity.get(foreign_key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::List(fks)) if many => fks.iter().collect(),
        Some(value) => vec![value],
    };
    values.into_iter()
}
