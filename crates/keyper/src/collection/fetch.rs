//! The request coalescing layer.
//!
//! Three entry points share one discipline: never launch a duplicate
//! request, and route every response through `insert` so snapshots, indexes,
//! and signals stay consistent. In-flight work lives in per-collection maps
//! of shared futures; whoever arrives first builds the future, everyone else
//! clones it, and the future removes its own entry when it settles — success
//! or failure — so a rejected request never poisons the cache.

use super::{CachedQuery, Collection, FetchOutcome, ItemFuture, QueryFuture, RelationMask, Slice};
use crate::entity::Entity;

use keyper_core::query::FetchParams;
use keyper_core::{Error, Key, Result};

use futures::FutureExt;

use std::collections::HashSet;
use std::sync::Arc;

/// Options accepted by the fetch entry points.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub(crate) force_load: bool,
    pub(crate) relations: Option<RelationMask>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bypass the cache and ask the data source even for cached keys.
    pub fn force_load(mut self) -> Self {
        self.force_load = true;
        self
    }

    /// Hydrate the given relations once the fetch resolves.
    pub fn relations(mut self, mask: RelationMask) -> Self {
        self.relations = Some(mask);
        self
    }
}

impl Collection {
    /// Loads one entity by primary key.
    ///
    /// Resolution order: cached snapshot (unless `force_load`), then an
    /// in-flight request for the same pk, then a fresh `find_one`. All
    /// paths finish by re-reading the current index and hydrating the
    /// requested relations.
    pub async fn fetch_one(&self, key: &Key, options: FetchOptions) -> Result<Arc<Entity>> {
        let mask = self.effective_mask(options.relations.as_ref());

        if !options.force_load {
            if let Some(entity) = self.cached(key) {
                tracing::trace!(collection = %self.shared.name, key = %key, "fetch_one cache hit");
                self.load_relations(std::slice::from_ref(&entity), &mask)
                    .await?;
                return Ok(entity);
            }
        }

        self.item_fetch(key).await?;

        let entity = self.get(key)?;
        self.load_relations(std::slice::from_ref(&entity), &mask)
            .await?;
        Ok(entity)
    }

    /// Loads the entities matching `params`.
    ///
    /// Unpaged parameter sets are answered from the query cache when
    /// possible and promoted into it after a network load. Identical
    /// in-flight parameter sets share one request. The resolved slice is
    /// built against the index current at resumption time, so coalesced
    /// callers observe the freshest snapshots.
    pub async fn fetch(&self, params: FetchParams, options: FetchOptions) -> Result<Slice> {
        let cache_key = params.cache_key();
        let pending_key = params.pending_key();

        if !options.force_load {
            if let Some(cache_key) = &cache_key {
                let cached = {
                    let state = self.shared.state.lock().unwrap();
                    state.queries.get(cache_key).map(|query| query.items.copy())
                };
                if let Some(index) = cached {
                    tracing::debug!(collection = %self.shared.name, "query cache hit");
                    let mut items: Vec<Arc<Entity>> = index.iter().cloned().collect();
                    if let Some(order_by) = &params.order_by {
                        items.sort_by(|a, b| order_by.compare_records(a.fields(), b.fields()));
                    }
                    let total = items.len() as u64;
                    return Ok(Slice { items, total });
                }
            }
        }

        let outcome = self.query_fetch(&params, cache_key, pending_key).await?;

        let mut items: Vec<Arc<Entity>> = {
            let state = self.shared.state.lock().unwrap();
            outcome
                .keys
                .iter()
                .filter_map(|key| state.index.get(key).cloned())
                .collect()
        };
        if let Some(order_by) = &params.order_by {
            items.sort_by(|a, b| order_by.compare_records(a.fields(), b.fields()));
        }
        let total = outcome.total.unwrap_or(items.len() as u64);
        Ok(Slice { items, total })
    }

    /// Batch-loads entities by primary key.
    ///
    /// The input partitions into already-cached keys (skipped unless
    /// `force_load`), keys with an in-flight request (joined), and missing
    /// keys (one `find_all`, registered under every missing pk). The result
    /// re-reads each requested pk — keys the source omitted are simply
    /// absent — and hydrates the requested relations.
    pub async fn fetch_all(&self, keys: &[Key], options: FetchOptions) -> Result<Vec<Arc<Entity>>> {
        let mask = self.effective_mask(options.relations.as_ref());

        let mut requested: Vec<Key> = Vec::with_capacity(keys.len());
        let mut seen = HashSet::new();
        for key in keys {
            if seen.insert(key.clone()) {
                requested.push(key.clone());
            }
        }

        let mut waits: Vec<ItemFuture> = Vec::new();
        {
            let mut state = self.shared.state.lock().unwrap();
            let mut missing: Vec<Key> = Vec::new();
            for key in &requested {
                if !options.force_load && state.index.has(key) {
                    continue;
                }
                if let Some(pending) = state.pending_items.get(key) {
                    waits.push(pending.clone());
                    continue;
                }
                missing.push(key.clone());
            }

            if !missing.is_empty() {
                let collection = self.clone();
                let batch = missing.clone();
                let future = async move {
                    let result = async {
                        let records = collection
                            .shared
                            .source
                            .find_all(&collection.shared.name, &batch)
                            .await
                            .map_err(|err| {
                                err.context(Error::source_operation_failed(
                                    collection.shared.name.clone(),
                                    "find_all",
                                ))
                            })?;
                        for record in records {
                            collection.insert(record)?;
                        }
                        Ok(())
                    }
                    .await;

                    let mut state = collection.shared.state.lock().unwrap();
                    for key in &batch {
                        state.pending_items.remove(key);
                    }
                    drop(state);
                    result
                }
                .boxed()
                .shared();

                for key in &missing {
                    state.pending_items.insert(key.clone(), future.clone());
                }
                waits.push(future);
            }
        }

        for wait in waits {
            wait.await?;
        }

        let items: Vec<Arc<Entity>> = {
            let state = self.shared.state.lock().unwrap();
            requested
                .iter()
                .filter_map(|key| state.index.get(key).cloned())
                .collect()
        };
        self.load_relations(&items, &mask).await?;
        Ok(items)
    }

    /// Joins or registers the in-flight fetch for one pk.
    fn item_fetch(&self, key: &Key) -> ItemFuture {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(pending) = state.pending_items.get(key) {
            tracing::trace!(collection = %self.shared.name, key = %key, "joined in-flight fetch");
            return pending.clone();
        }

        let collection = self.clone();
        let key = key.clone();
        let future = {
            let key = key.clone();
            async move {
                let result = match collection
                    .shared
                    .source
                    .find_one(&collection.shared.name, &key)
                    .await
                {
                    Ok(record) => collection.insert(record).map(drop),
                    Err(err) => Err(err.context(Error::source_operation_failed(
                        collection.shared.name.clone(),
                        "find_one",
                    ))),
                };
                collection
                    .shared
                    .state
                    .lock()
                    .unwrap()
                    .pending_items
                    .remove(&key);
                result
            }
        }
        .boxed()
        .shared();

        state.pending_items.insert(key, future.clone());
        future
    }

    /// Joins or registers the in-flight fetch for one parameter set.
    fn query_fetch(
        &self,
        params: &FetchParams,
        cache_key: Option<String>,
        pending_key: String,
    ) -> QueryFuture {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(pending) = state.pending.get(&pending_key) {
            tracing::trace!(collection = %self.shared.name, "joined in-flight query");
            return pending.clone();
        }

        let collection = self.clone();
        let params = params.clone();
        let settled_key = pending_key.clone();
        let future = async move {
            let result = async {
                let loaded = collection
                    .shared
                    .source
                    .find(&collection.shared.name, &params)
                    .await
                    .map_err(|err| {
                        err.context(Error::source_operation_failed(
                            collection.shared.name.clone(),
                            "find",
                        ))
                    })?;
                let total = loaded.total;

                let mut entities = Vec::with_capacity(loaded.items.len());
                for record in loaded.items {
                    entities.push(collection.insert(record)?);
                }
                let keys: Vec<Key> = entities.iter().map(|e| e.key().clone()).collect();

                if let Some(cache_key) = cache_key {
                    let mut state = collection.shared.state.lock().unwrap();
                    state.queries.insert(
                        cache_key,
                        CachedQuery {
                            filter: params.filter.clone(),
                            items: entities.iter().cloned().collect(),
                        },
                    );
                    tracing::debug!(
                        collection = %collection.shared.name,
                        results = keys.len(),
                        "promoted query result into the cache"
                    );
                }

                Ok(FetchOutcome { keys, total })
            }
            .await;

            collection
                .shared
                .state
                .lock()
                .unwrap()
                .pending
                .remove(&settled_key);
            result
        }
        .boxed()
        .shared();

        state.pending.insert(pending_key, future.clone());
        future
    }
}
