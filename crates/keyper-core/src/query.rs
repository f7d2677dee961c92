//! The query language: predicate criteria and multi-key ordering over dotted
//! field paths, plus the fetch-parameter envelope shared by cache lookups and
//! data sources.

mod criteria;
pub use criteria::Criteria;

mod direction;
pub use direction::Direction;

mod eval;

mod fingerprint;

mod like;
pub use like::LikePattern;

mod op;
pub use op::CompareOp;

mod order_by;
pub use order_by::OrderBy;

mod order_by_expr;
pub use order_by_expr::OrderByExpr;

mod params;
pub use params::FetchParams;

mod path;
pub use path::Path;
