use crate::{Error, Result};

/// A `$like` string pattern.
///
/// Supports a leading and/or trailing `%` wildcard: `%x%` substring, `x%`
/// prefix, `%x` suffix. A pattern with neither wildcard is rejected when the
/// pattern is built, so matching itself cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikePattern {
    pattern: String,
    needle: String,
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Contains,
    Prefix,
    Suffix,
}

impl LikePattern {
    pub fn parse(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();

        let leading = pattern.starts_with('%');
        let trailing = pattern.ends_with('%') && (pattern.len() > 1 || !leading);
        if !leading && !trailing {
            return Err(Error::invalid_query(format!(
                "like pattern `{pattern}` has no `%` wildcard"
            )));
        }

        let needle = pattern[leading as usize..pattern.len() - trailing as usize].to_string();
        let mode = match (leading, trailing) {
            (true, true) => Mode::Contains,
            (false, true) => Mode::Prefix,
            (true, false) => Mode::Suffix,
            (false, false) => unreachable!(),
        };

        Ok(Self {
            pattern,
            needle,
            mode,
        })
    }

    /// The original pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, value: &str) -> bool {
        match self.mode {
            Mode::Contains => value.contains(&self.needle),
            Mode::Prefix => value.starts_with(&self.needle),
            Mode::Suffix => value.ends_with(&self.needle),
        }
    }
}
