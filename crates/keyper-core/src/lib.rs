#[macro_use]
mod macros;

mod error;
pub use error::Error;

mod key;
pub use key::Key;

pub mod query;

mod source;
pub use source::{DataSource, Loaded};

mod value;
pub use value::Value;

mod value_cmp;

mod value_record;
pub use value_record::ValueRecord;

/// A Result type alias that uses Keyper's [`Error`] type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use async_trait::async_trait;
