//! Comparison helpers for `Value`.
//!
//! Criteria evaluation and comparators need slightly looser semantics than
//! `PartialEq`/`PartialOrd`: integers compare numerically across the signed
//! and unsigned variants, and comparators need a total order over mixed
//! variants so a sort never panics.

use crate::{Value, ValueRecord};

use std::cmp::Ordering;

/// Equality with numeric widening across `I64`/`U64`.
pub(crate) fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::I64(a), Value::U64(b)) | (Value::U64(b), Value::I64(a)) => {
            u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
        }
        _ => a == b,
    }
}

/// Same-type ordering with numeric widening. `None` for null, mixed types,
/// and types without a natural order.
pub(crate) fn partial_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,

        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),

        (Value::I64(a), Value::I64(b)) => a.partial_cmp(b),
        (Value::U64(a), Value::U64(b)) => a.partial_cmp(b),
        (Value::I64(a), Value::U64(b)) => Some(cmp_i64_u64(*a, *b)),
        (Value::U64(a), Value::I64(b)) => Some(cmp_i64_u64(*b, *a).reverse()),

        // Strings: lexicographic ordering.
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),

        (Value::Uuid(a), Value::Uuid(b)) => a.partial_cmp(b),

        _ => None,
    }
}

/// Total order used by comparators: null first, then booleans, numbers,
/// strings, UUIDs, lists, records.
pub(crate) fn total_cmp(a: &Value, b: &Value) -> Ordering {
    if let Some(ordering) = partial_cmp(a, b) {
        return ordering;
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::List(a), Value::List(b)) => {
            for (a, b) in a.iter().zip(b.iter()) {
                let ordering = total_cmp(a, b);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Record(ra), Value::Record(rb)) => {
            if ra == rb {
                Ordering::Equal
            } else {
                a.fingerprint().cmp(&b.fingerprint())
            }
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

fn cmp_i64_u64(a: i64, b: u64) -> Ordering {
    match u64::try_from(a) {
        Ok(a) => a.cmp(&b),
        Err(_) => Ordering::Less,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::I64(_) | Value::U64(_) => 2,
        Value::String(_) => 3,
        Value::Uuid(_) => 4,
        Value::List(_) => 5,
        Value::Record(_) => 6,
    }
}

// Comparison conveniences so tests can assert against plain literals.

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        matches!(self, Value::I64(val) if val == other)
    }
}

impl PartialEq<u64> for Value {
    fn eq(&self, other: &u64) -> bool {
        matches!(self, Value::U64(val) if val == other)
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Value::Bool(val) if val == other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Value::String(val) if val == other)
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        matches!(self, Value::String(val) if val == other)
    }
}

impl PartialEq<String> for Value {
    fn eq(&self, other: &String) -> bool {
        matches!(self, Value::String(val) if val == other)
    }
}

impl PartialEq<ValueRecord> for Value {
    fn eq(&self, other: &ValueRecord) -> bool {
        matches!(self, Value::Record(val) if val == other)
    }
}
