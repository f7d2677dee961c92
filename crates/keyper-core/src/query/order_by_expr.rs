use super::{Direction, Path};
use crate::{value_cmp, Result, Value, ValueRecord};

use std::cmp::Ordering;

/// One ordering component: a field path and a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub path: Path,
    pub direction: Direction,
}

impl OrderByExpr {
    /// Parses `"path"`, `"path+"` (ascending, the default) or `"path-"`
    /// (descending).
    pub fn parse(spec: &str) -> Result<Self> {
        let (path, direction) = match spec.as_bytes().last() {
            Some(b'+') => (&spec[..spec.len() - 1], Direction::Asc),
            Some(b'-') => (&spec[..spec.len() - 1], Direction::Desc),
            _ => (spec, Direction::Asc),
        };

        Ok(Self {
            path: Path::parse(path)?,
            direction,
        })
    }

    pub fn compare_records(&self, a: &ValueRecord, b: &ValueRecord) -> Ordering {
        let ordering = compare_resolved(self.path.resolve_record(a), self.path.resolve_record(b));
        if self.direction.is_desc() {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

fn compare_resolved(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        // Missing values sort first.
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        // Strings compare case-insensitively.
        (Some(Value::String(a)), Some(Value::String(b))) => {
            a.to_lowercase().cmp(&b.to_lowercase())
        }
        (Some(a), Some(b)) => value_cmp::total_cmp(a, b),
    }
}
