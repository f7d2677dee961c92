use super::Error;

/// Error when a record lookup (by key or relation) returns no results.
#[derive(Debug)]
pub(super) struct RecordNotFound {
    context: Option<Box<str>>,
}

impl std::error::Error for RecordNotFound {}

impl core::fmt::Display for RecordNotFound {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("record not found")?;
        if let Some(ref ctx) = self.context {
            write!(f, ": {}", ctx)?;
        }
        Ok(())
    }
}

impl Error {
    /// Creates a record not found error.
    ///
    /// The context parameter describes what was not found; additional context
    /// can be added at each layer via `.context()`.
    pub fn record_not_found(context: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::RecordNotFound(RecordNotFound {
            context: Some(context.into().into()),
        }))
    }

    /// Returns `true` if any error in the chain is a record not found error.
    pub fn is_record_not_found(&self) -> bool {
        self.chain()
            .any(|err| matches!(err.kind(), super::ErrorKind::RecordNotFound(_)))
    }
}
