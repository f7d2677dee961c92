use super::{fingerprint, Criteria, OrderBy};

use std::fmt::Write;

/// Fetch parameters: a filter plus optional ordering and paging.
///
/// Two fingerprints address the caches:
/// - [`cache_key`](Self::cache_key) identifies a query-cache slot. Paged
///   fetches are never cached, and the ordering is excluded — the cached
///   member set is ordering-independent.
/// - [`pending_key`](Self::pending_key) identifies an in-flight request and
///   covers every parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchParams {
    pub filter: Criteria,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Criteria) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn cache_key(&self) -> Option<String> {
        if self.limit.is_some() || self.offset.is_some() {
            return None;
        }
        Some(self.filter.fingerprint())
    }

    pub fn pending_key(&self) -> String {
        let mut out = String::from("{where:");
        fingerprint::write_criteria(&self.filter, &mut out);

        out.push_str(",orderBy:");
        match &self.order_by {
            Some(order_by) => order_by.write_fingerprint(&mut out),
            None => out.push_str("null"),
        }

        match self.limit {
            Some(limit) => {
                let _ = write!(out, ",limit:{limit}");
            }
            None => out.push_str(",limit:null"),
        }
        match self.offset {
            Some(offset) => {
                let _ = write!(out, ",offset:{offset}");
            }
            None => out.push_str(",offset:null"),
        }

        out.push('}');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn paged_params_have_no_cache_key() {
        let params = FetchParams::new().filter(Criteria::eq(1));
        assert!(params.cache_key().is_some());

        assert!(params.clone().limit(10).cache_key().is_none());
        assert!(params.offset(10).cache_key().is_none());
    }

    #[test]
    fn cache_key_ignores_ordering() {
        let filter = Criteria::parse(&record! { "author_id" => 7 }.into()).unwrap();
        let plain = FetchParams::new().filter(filter.clone());
        let ordered = FetchParams::new()
            .filter(filter)
            .order_by(OrderBy::parse("text").unwrap());

        assert_eq!(plain.cache_key(), ordered.cache_key());
        assert_ne!(plain.pending_key(), ordered.pending_key());
    }

    #[test]
    fn pending_key_covers_paging() {
        let base = FetchParams::new().order_by(OrderBy::parse("text").unwrap());
        let paged = base.clone().limit(10).offset(20);
        assert_ne!(base.pending_key(), paged.pending_key());
    }
}
