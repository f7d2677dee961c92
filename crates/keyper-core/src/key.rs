use crate::{Error, Result, Value};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A primary key: a primitive or an ordered tuple of primitives.
///
/// Equality and hashing go through the canonical string form, so `Int(1)`
/// and `Text("1")` address the same cache slot; ordering is lexical over the
/// same form. Composite keys are flat (components are never composite).
#[derive(Debug, Clone)]
pub enum Key {
    Int(i64),
    Uint(u64),
    Text(String),
    Composite(Vec<Key>),
}

impl Key {
    /// Builds a key component from an attribute value.
    ///
    /// Nullish and structured values are not keys.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::I64(v) => Ok(Self::Int(*v)),
            Value::U64(v) => Ok(Self::Uint(*v)),
            Value::String(v) => Ok(Self::Text(v.clone())),
            Value::Uuid(v) => Ok(Self::Text(v.to_string())),
            _ => Err(Error::invalid_key(format!(
                "expected a string or number, got {value:?}"
            ))),
        }
    }

    /// Builds a compound key from its components.
    pub fn composite(parts: Vec<Key>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::invalid_key("compound key has no components"));
        }
        if parts.iter().any(Key::is_composite) {
            return Err(Error::invalid_key("compound key components must be primitive"));
        }
        Ok(Self::Composite(parts))
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// The canonical string form used for map addressing and ordering.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// The key as an attribute value (composite keys become lists).
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(v) => Value::I64(*v),
            Self::Uint(v) => Value::U64(*v),
            Self::Text(v) => Value::String(v.clone()),
            Self::Composite(parts) => Value::List(parts.iter().map(Key::to_value).collect()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Composite(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    fmt::Display::fmt(part, f)?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl From<i64> for Key {
    fn from(src: i64) -> Self {
        Self::Int(src)
    }
}

impl From<u64> for Key {
    fn from(src: u64) -> Self {
        Self::Uint(src)
    }
}

impl From<&str> for Key {
    fn from(src: &str) -> Self {
        Self::Text(src.to_string())
    }
}

impl From<String> for Key {
    fn from(src: String) -> Self {
        Self::Text(src)
    }
}
