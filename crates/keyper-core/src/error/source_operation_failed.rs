use super::Error;

/// Error wrapping a data source rejection with the failing operation.
#[derive(Debug)]
pub(super) struct SourceOperationFailed {
    collection: Box<str>,
    operation: Box<str>,
}

impl std::error::Error for SourceOperationFailed {}

impl core::fmt::Display for SourceOperationFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "data source operation failed: {}.{}",
            self.collection, self.operation
        )
    }
}

impl Error {
    /// Creates a data source operation failure, used as context over the
    /// source's own rejection.
    pub fn source_operation_failed(
        collection: impl Into<String>,
        operation: impl Into<String>,
    ) -> Error {
        Error::from(super::ErrorKind::SourceOperationFailed(
            SourceOperationFailed {
                collection: collection.into().into(),
                operation: operation.into().into(),
            },
        ))
    }

    /// Returns `true` if any error in the chain is a source operation failure.
    pub fn is_source_operation_failed(&self) -> bool {
        self.chain()
            .any(|err| matches!(err.kind(), super::ErrorKind::SourceOperationFailed(_)))
    }
}
