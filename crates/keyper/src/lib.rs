//! Keyper is an in-memory entity store that sits between application code
//! and a remote backing store. It holds immutable entity snapshots keyed by
//! primary key, maintains secondary indexes and relation graphs between
//! collections, deduplicates in-flight fetches, caches query results, and
//! exposes live, auto-updating filtered views.

mod collection;
pub use collection::{
    Collection, CollectionConfig, CollectionDefaults, FetchOptions, Inserted, Related,
    RelationConfig, RelationMask, Slice,
};

mod db;
pub use db::Db;

mod entity;
pub use entity::{Entity, MutableEntity};

pub mod index;
pub use index::{NonUniqueIndex, UniqueIndex};

mod signal;
pub use signal::{Signal, SignalGuard};

pub mod view;
pub use view::{CollectionView, LoadMoreView, PaginatedView, ViewOptions};

pub use keyper_core::{
    query, DataSource, Error, Key, Loaded, Result, Value, ValueRecord,
};

pub use keyper_core::{err, record};
