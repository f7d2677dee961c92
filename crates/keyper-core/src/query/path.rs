use crate::{Error, Result, Value, ValueRecord};

use std::fmt;

/// A dot-separated traversal through nested attribute records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(Error::invalid_query(format!("malformed field path `{path}`")));
        }
        Ok(Self {
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The single segment of a non-nested path, if it is one.
    pub fn single(&self) -> Option<&str> {
        match &self.segments[..] {
            [segment] => Some(segment),
            _ => None,
        }
    }

    /// Resolves the path against a value. Traversal through a missing field
    /// or a non-record yields `None`.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.resolve_record(value.as_record()?)
    }

    /// Resolves the path starting from an attribute record.
    pub fn resolve_record<'a>(&self, record: &'a ValueRecord) -> Option<&'a Value> {
        let mut segments = self.segments.iter();
        let mut current = record.get(segments.next()?)?;
        for segment in segments {
            current = current.as_record()?.get(segment)?;
        }
        Some(current)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}
