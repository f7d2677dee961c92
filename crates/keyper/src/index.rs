//! The index engine: a pk-sorted unique index and per-field non-unique
//! bucket indexes built on top of it.

mod non_unique;
pub use non_unique::NonUniqueIndex;

mod unique;
pub use unique::UniqueIndex;
