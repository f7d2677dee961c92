use super::RelationConfig;

use keyper_core::{DataSource, ValueRecord};

use indexmap::IndexMap;

use std::fmt;
use std::sync::Arc;

/// A payload transform applied on ingress (`before_insert`) or egress
/// (`before_send`). The transform's return value is authoritative.
pub type Transform = Arc<dyn Fn(ValueRecord) -> ValueRecord + Send + Sync>;

/// Per-collection configuration, builder style.
#[derive(Clone)]
pub struct CollectionConfig {
    pub(crate) primary_key: Vec<String>,
    pub(crate) source: Arc<dyn DataSource>,
    pub(crate) before_insert: Option<Transform>,
    pub(crate) before_send: Option<Transform>,
    pub(crate) parent: Option<String>,
    pub(crate) relations: IndexMap<String, RelationConfig>,
}

impl CollectionConfig {
    /// A configuration over the given data source, keyed by `id`.
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            primary_key: vec!["id".to_string()],
            source,
            before_insert: None,
            before_send: None,
            parent: None,
            relations: IndexMap::new(),
        }
    }

    /// Names the primary key field(s). More than one field forms a compound
    /// key.
    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Transform applied to every payload entering the cache.
    pub fn before_insert(
        mut self,
        transform: impl Fn(ValueRecord) -> ValueRecord + Send + Sync + 'static,
    ) -> Self {
        self.before_insert = Some(Arc::new(transform));
        self
    }

    /// Transform applied to every payload sent to the data source.
    pub fn before_send(
        mut self,
        transform: impl Fn(ValueRecord) -> ValueRecord + Send + Sync + 'static,
    ) -> Self {
        self.before_send = Some(Arc::new(transform));
        self
    }

    /// Names the relation field whose target collection adopts this one as a
    /// child. Data sources use the parent chain to compose nested endpoints.
    pub fn parent(mut self, relation_field: impl Into<String>) -> Self {
        self.parent = Some(relation_field.into());
        self
    }

    /// Declares a forward relation on `field`.
    pub fn relation(mut self, field: impl Into<String>, relation: RelationConfig) -> Self {
        self.relations.insert(field.into(), relation);
        self
    }

    pub(crate) fn merge_defaults(mut self, defaults: &CollectionDefaults) -> Self {
        if self.before_insert.is_none() {
            self.before_insert = defaults.before_insert.clone();
        }
        if self.before_send.is_none() {
            self.before_send = defaults.before_send.clone();
        }
        self
    }
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("primary_key", &self.primary_key)
            .field("parent", &self.parent)
            .field("relations", &self.relations)
            .field("before_insert", &self.before_insert.is_some())
            .field("before_send", &self.before_send.is_some())
            .finish()
    }
}

/// Database-wide defaults merged under every collection's own configuration.
#[derive(Clone, Default)]
pub struct CollectionDefaults {
    pub(crate) before_insert: Option<Transform>,
    pub(crate) before_send: Option<Transform>,
}

impl CollectionDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_insert(
        mut self,
        transform: impl Fn(ValueRecord) -> ValueRecord + Send + Sync + 'static,
    ) -> Self {
        self.before_insert = Some(Arc::new(transform));
        self
    }

    pub fn before_send(
        mut self,
        transform: impl Fn(ValueRecord) -> ValueRecord + Send + Sync + 'static,
    ) -> Self {
        self.before_send = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for CollectionDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionDefaults")
            .field("before_insert", &self.before_insert.is_some())
            .field("before_send", &self.before_send.is_some())
            .finish()
    }
}
