use super::{Mode, ViewCore, ViewOptions};
use crate::collection::Collection;
use crate::entity::Entity;

use keyper_core::query::{Criteria, OrderBy};
use keyper_core::{Key, Result};

use std::sync::Arc;

/// A live view over one page of its collection.
///
/// `offset = current_page * page_size`, `limit = page_size`; the ordering is
/// required (paging without one is rejected by the underlying query).
/// Inserts that sort outside the current page window are skipped; matching
/// removals decrement the total.
pub struct PaginatedView {
    core: ViewCore,
}

impl PaginatedView {
    pub fn new(collection: &Collection, options: ViewOptions, page_size: u64) -> Self {
        Self {
            core: ViewCore::new(collection.clone(), options, Mode::Paginated { page_size }),
        }
    }

    pub async fn load(&self) -> Result<()> {
        self.core.load().await
    }

    /// Jumps to a page and reloads.
    pub async fn set_page(&self, page: u64) -> Result<()> {
        self.core.set_page(page).await
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

    pub fn current_page(&self) -> u64 {
        self.core.page()
    }

    /// Full-match count across all pages.
    pub fn total(&self) -> u64 {
        self.core.total()
    }

    pub fn dispose(self) {}
}
