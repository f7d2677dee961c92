//! Live, auto-updating filtered views over a collection.
//!
//! A view subscribes to its collection's `inserted`/`removed` signals and
//! maintains a sorted subset matching a criteria. Reloads are race-safe: a
//! monotonic sequence tags every load, and a completion whose sequence is
//! stale discards itself. Insert-time relation hydration is guarded the
//! same way, per pk.

mod load_more;
pub use load_more::LoadMoreView;

mod paginated;
pub use paginated::PaginatedView;

use crate::collection::{Collection, FetchOptions, Inserted, RelationMask, Slice};
use crate::entity::Entity;
use crate::signal::SignalGuard;

use keyper_core::query::{Criteria, FetchParams, OrderBy};
use keyper_core::{Key, Result};

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Options shared by every view flavor.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub(crate) filter: Criteria,
    pub(crate) order_by: OrderBy,
    pub(crate) relations: Option<RelationMask>,
    pub(crate) from_cache: bool,
}

impl ViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Criteria) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    /// Hydrate these relations for loaded and inserted items.
    pub fn relations(mut self, mask: RelationMask) -> Self {
        self.relations = Some(mask);
        self
    }

    /// Load through the local cache (`filter`) instead of the data source.
    pub fn from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Mode {
    Plain,
    Paginated { page_size: u64 },
    Accumulate { page_size: u64 },
}

pub(crate) struct ViewState {
    items: Vec<Arc<Entity>>,
    keys: HashSet<Key>,
    filter: Criteria,
    order_by: OrderBy,
    from_cache: bool,
    loading: bool,
    load_seq: u64,
    page: u64,
    total: u64,
    insert_seq: HashMap<Key, u64>,
    insert_counter: u64,
}

pub(crate) struct ViewInner {
    collection: Collection,
    relations: Option<RelationMask>,
    mode: Mode,
    state: Mutex<ViewState>,
}

/// The machinery shared by the view flavors; the public types wrap it with
/// mode-appropriate APIs.
pub(crate) struct ViewCore {
    inner: Arc<ViewInner>,
    _guards: [SignalGuard; 2],
}

impl ViewCore {
    pub(crate) fn new(collection: Collection, options: ViewOptions, mode: Mode) -> Self {
        let inner = Arc::new(ViewInner {
            relations: options.relations.clone(),
            mode,
            state: Mutex::new(ViewState {
                items: Vec::new(),
                keys: HashSet::new(),
                filter: options.filter,
                order_by: options.order_by,
                from_cache: options.from_cache,
                loading: false,
                load_seq: 0,
                page: 0,
                total: 0,
                insert_seq: HashMap::new(),
                insert_counter: 0,
            }),
            collection: collection.clone(),
        });

        let weak = Arc::downgrade(&inner);
        let inserted = collection.inserted().attach(move |event: &Inserted| {
            if let Some(inner) = weak.upgrade() {
                ViewInner::on_inserted(&inner, event);
            }
        });

        let weak = Arc::downgrade(&inner);
        let removed = collection.removed().attach(move |entity: &Arc<Entity>| {
            if let Some(inner) = weak.upgrade() {
                inner.on_removed(entity);
            }
        });

        Self {
            inner,
            _guards: [inserted, removed],
        }
    }

    /// (Re)loads the view's contents. A load that gets superseded by a newer
    /// one quietly discards its result.
    pub(crate) async fn load(&self) -> Result<()> {
        let inner = &self.inner;
        let (seq, params, from_cache) = {
            let mut state = inner.state.lock().unwrap();
            state.load_seq += 1;
            state.loading = true;
            (state.load_seq, inner.params_for(&state), state.from_cache)
        };

        let outcome = inner.fetch_slice(params, from_cache).await;

        let mut state = inner.state.lock().unwrap();
        if state.load_seq != seq {
            tracing::trace!(collection = %inner.collection.name(), "discarding superseded view load");
            return Ok(());
        }
        state.loading = false;
        let slice = outcome?;

        match inner.mode {
            Mode::Plain | Mode::Paginated { .. } => {
                state.keys = slice.items.iter().map(|e| e.key().clone()).collect();
                state.items = slice.items;
                state.total = slice.total;
            }
            Mode::Accumulate { .. } => {
                if state.page == 0 {
                    state.keys = slice.items.iter().map(|e| e.key().clone()).collect();
                    state.items = slice.items;
                } else {
                    for entity in slice.items {
                        ViewInner::insert_sorted(&mut state, entity);
                    }
                }
                state.total = slice.total;
            }
        }
        Ok(())
    }

    pub(crate) async fn set_filter(&self, filter: Criteria) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.filter == filter {
                return Ok(());
            }
            state.filter = filter;
            state.page = 0;
        }
        self.load().await
    }

    pub(crate) async fn set_order_by(&self, order_by: OrderBy) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.order_by == order_by {
                return Ok(());
            }
            state.order_by = order_by;
            state.page = 0;
        }
        self.load().await
    }

    pub(crate) async fn set_page(&self, page: u64) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.page = page;
        }
        self.load().await
    }

    pub(crate) async fn advance_page(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.page += 1;
        }
        self.load().await
    }

    pub(crate) async fn reset_and_load(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.page = 0;
        }
        self.load().await
    }

    pub(crate) fn items(&self) -> Vec<Arc<Entity>> {
        self.inner.state.lock().unwrap().items.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.state.lock().unwrap().items.len()
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.inner.state.lock().unwrap().keys.contains(key)
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.inner.state.lock().unwrap().loading
    }

    pub(crate) fn total(&self) -> u64 {
        self.inner.state.lock().unwrap().total
    }

    pub(crate) fn page(&self) -> u64 {
        self.inner.state.lock().unwrap().page
    }
}

impl ViewInner {
    fn params_for(&self, state: &ViewState) -> FetchParams {
        let mut params = FetchParams::new().filter(state.filter.clone());
        if !state.order_by.is_empty() {
            params = params.order_by(state.order_by.clone());
        }
        match self.mode {
            Mode::Plain => {}
            Mode::Paginated { page_size } | Mode::Accumulate { page_size } => {
                params = params.offset(state.page * page_size).limit(page_size);
            }
        }
        params
    }

    async fn fetch_slice(&self, params: FetchParams, from_cache: bool) -> Result<Slice> {
        let slice = if from_cache {
            self.collection.filter(&params)?
        } else {
            self.collection.fetch(params, FetchOptions::new()).await?
        };
        if let Some(mask) = &self.relations {
            self.collection.load_relations(&slice.items, mask).await?;
        }
        Ok(slice)
    }

    fn on_inserted(inner: &Arc<ViewInner>, event: &Inserted) {
        let mut state = inner.state.lock().unwrap();

        if let Some(previous) = &event.previous {
            if state.keys.remove(previous.key()) {
                let key = previous.key();
                state.items.retain(|e| e.key() != key);
            }
        }

        if !state.filter.matches_record(event.entity.fields()) {
            return;
        }

        if let Mode::Paginated { page_size } = inner.mode {
            if event.previous.is_none() {
                state.total += 1;
            }
            // Skip inserts that land outside the current page window.
            let is_last_page = (state.page + 1) * page_size >= state.total;
            if let Some(last) = state.items.last() {
                if !is_last_page
                    && state
                        .order_by
                        .compare_records(event.entity.fields(), last.fields())
                        == Ordering::Greater
                {
                    return;
                }
            }
            if let Some(first) = state.items.first() {
                if state.page > 0
                    && state
                        .order_by
                        .compare_records(event.entity.fields(), first.fields())
                        == Ordering::Less
                {
                    return;
                }
            }
        }

        match &inner.relations {
            Some(mask) if !mask.is_empty() => {
                // Hydrate first, apply after — unless a newer insert or a
                // removal for the same pk supersedes this one meanwhile.
                state.insert_counter += 1;
                let seq = state.insert_counter;
                state.insert_seq.insert(event.entity.key().clone(), seq);
                drop(state);

                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    // No runtime to hydrate on; the accessors resolve lazily.
                    let mut state = inner.state.lock().unwrap();
                    if state.insert_seq.get(event.entity.key()) == Some(&seq) {
                        state.insert_seq.remove(event.entity.key());
                        Self::insert_sorted(&mut state, event.entity.clone());
                    }
                    return;
                };

                let inner = inner.clone();
                let entity = event.entity.clone();
                let mask = mask.clone();
                handle.spawn(async move {
                    let _ = inner
                        .collection
                        .load_relations(std::slice::from_ref(&entity), &mask)
                        .await;
                    let mut state = inner.state.lock().unwrap();
                    if state.insert_seq.get(entity.key()) == Some(&seq) {
                        state.insert_seq.remove(entity.key());
                        if state.filter.matches_record(entity.fields()) {
                            Self::insert_sorted(&mut state, entity);
                        }
                    }
                });
            }
            _ => Self::insert_sorted(&mut state, event.entity.clone()),
        }
    }

    fn on_removed(&self, entity: &Arc<Entity>) {
        let mut state = self.state.lock().unwrap();
        state.insert_seq.remove(entity.key());
        if state.keys.remove(entity.key()) {
            let key = entity.key();
            state.items.retain(|e| e.key() != key);
        }
        if matches!(self.mode, Mode::Paginated { .. })
            && state.filter.matches_record(entity.fields())
        {
            state.total = state.total.saturating_sub(1);
        }
    }

    fn insert_sorted(state: &mut ViewState, entity: Arc<Entity>) {
        if !state.keys.insert(entity.key().clone()) {
            let key = entity.key();
            state.items.retain(|e| e.key() != key);
        }
        let index = sorted_insert_index(&state.items, &state.order_by, &entity);
        state.items.insert(index, entity);
    }
}

/// Index at which `entity` keeps `items` sorted (after any equal run).
fn sorted_insert_index(items: &[Arc<Entity>], order_by: &OrderBy, entity: &Entity) -> usize {
    items.partition_point(|existing| {
        order_by.compare_records(existing.fields(), entity.fields()) != Ordering::Greater
    })
}

/// A live, auto-updating filtered subset of a collection.
pub struct CollectionView {
    core: ViewCore,
}

impl CollectionView {
    pub fn new(collection: &Collection, options: ViewOptions) -> Self {
        Self {
            core: ViewCore::new(collection.clone(), options, Mode::Plain),
        }
    }

    pub async fn load(&self) -> Result<()> {
        self.core.load().await
    }

    /// Replaces the filter and reloads; a structurally equal filter is a
    /// no-op.
    pub async fn set_filter(&self, filter: Criteria) -> Result<()> {
        self.core.set_filter(filter).await
    }

    /// Replaces the ordering and reloads; a structurally equal ordering is
    /// a no-op.
    pub async fn set_order_by(&self, order_by: OrderBy) -> Result<()> {
        self.core.set_order_by(order_by).await
    }

    /// The current items, sorted by the view's ordering.
    pub fn items(&self) -> Vec<Arc<Entity>> {
        self.core.items()
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.core.contains(key)
    }

    pub fn is_loading(&self) -> bool {
        self.core.is_loading()
    }

    /// Detaches the signal bindings. Dropping the view does the same.
    pub fn dispose(self) {}
}
