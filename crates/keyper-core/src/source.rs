use crate::{query::FetchParams, Key, Result, ValueRecord};

use crate::async_trait;

use std::fmt::Debug;

/// Response to [`DataSource::find`]: the matching records plus an optional
/// full-match count ignoring paging.
#[derive(Debug, Default)]
pub struct Loaded {
    pub items: Vec<ValueRecord>,
    pub total: Option<u64>,
}

impl Loaded {
    pub fn new(items: Vec<ValueRecord>) -> Self {
        Self { items, total: None }
    }

    pub fn with_total(items: Vec<ValueRecord>, total: u64) -> Self {
        Self {
            items,
            total: Some(total),
        }
    }
}

/// The backing store boundary.
///
/// A data source is an opaque CRUD provider; every response flows back
/// through the owning collection's insert path, so the source never has to
/// know about caching, indexes, or relations. Rejections propagate to the
/// callers awaiting the operation and never leave partial cache state
/// behind.
#[async_trait]
pub trait DataSource: Debug + Send + Sync + 'static {
    /// Loads a single record by primary key. Rejects if the record does not
    /// exist.
    async fn find_one(&self, collection: &str, key: &Key) -> Result<ValueRecord>;

    /// Loads the records matching `params`. The response may carry a total
    /// full-match count ignoring `limit`/`offset`.
    async fn find(&self, collection: &str, params: &FetchParams) -> Result<Loaded>;

    /// Batch-loads records by primary key. Order is not significant and
    /// missing keys are permitted; the caller handles gaps.
    async fn find_all(&self, collection: &str, keys: &[Key]) -> Result<Vec<ValueRecord>>;

    /// Creates a record. The response is authoritative.
    async fn create(&self, collection: &str, payload: ValueRecord) -> Result<ValueRecord>;

    /// Updates the record addressed by `key`. The response is authoritative.
    async fn update(&self, collection: &str, key: &Key, payload: ValueRecord)
        -> Result<ValueRecord>;

    /// Deletes the record addressed by `key`.
    async fn delete(&self, collection: &str, key: &Key) -> Result<()>;
}
