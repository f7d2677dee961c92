use super::{Mode, ViewCore, ViewOptions};
use crate::collection::Collection;
use crate::entity::Entity;

use keyper_core::query::{Criteria, OrderBy};
use keyper_core::{Key, Result};

use std::sync::Arc;

/// The accumulating view: successive pages merge into one sorted,
/// pk-deduplicated list.
///
/// [`load`](Self::load) resets to the first page; [`load_more`](Self::load_more)
/// advances and merges. Filter or ordering changes reset the accumulated
/// state.
pub struct LoadMoreView {
    core: ViewCore,
}

impl LoadMoreView {
    pub fn new(collection: &Collection, options: ViewOptions, page_size: u64) -> Self {
        Self {
            core: ViewCore::new(collection.clone(), options, Mode::Accumulate { page_size }),
        }
    }

    /// Loads the first page, dropping anything accumulated.
    pub async fn load(&self) -> Result<()> {
        self.core.reset_and_load().await
    }

    /// Loads the next page and merges it in.
    pub async fn load_more(&self) -> Result<()> {
        self.core.advance_page().await
    }

    pub async fn set_filter(&self, filter: Criteria) -> Result<()> {
        self.core.set_filter(filter).await
    }

    pub async fn set_order_by(&self, order_by: OrderBy) -> Result<()> {
        self.core.set_order_by(order_by).await
    }

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

    /// Full-match count reported by the last load.
    pub fn total(&self) -> u64 {
        self.core.total()
    }

    pub fn dispose(self) {}
}
