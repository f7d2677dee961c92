use super::Error;

/// Error for malformed criteria, patterns, or paging parameters.
#[derive(Debug)]
pub(super) struct InvalidQuery {
    context: Box<str>,
}

impl std::error::Error for InvalidQuery {}

impl core::fmt::Display for InvalidQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid query: {}", self.context)
    }
}

impl Error {
    /// Creates an invalid query error.
    pub fn invalid_query(context: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidQuery(InvalidQuery {
            context: context.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid query error.
    pub fn is_invalid_query(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidQuery(_))
    }
}
