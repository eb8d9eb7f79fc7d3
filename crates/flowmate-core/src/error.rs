//! Operation-level errors
//!
//! Store failures are converted here at the operation boundary, depending
//! on whether the operation was a read or a write.

use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by note, sharing and shift operations
#[derive(Error, Debug)]
pub enum Error {
    /// A non-owner attempted an owner-only action
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The action requires a signed-in user
    #[error("Sign in required to {0}")]
    NotAuthenticated(String),

    /// Token or note does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backing store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The backing store rejected a write
    #[error("Store write failed: {0}")]
    StoreWriteFailed(#[source] StoreError),

    /// The user aborted an in-flight save
    #[error("Cancelled by user")]
    Cancelled,

    /// Required input is missing
    #[error("Invalid input: {0}")]
    Validation(String),
}

impl Error {
    /// Convert a failure from a read-only store call
    pub fn from_store_read(err: StoreError) -> Self {
        Error::StoreUnavailable(err)
    }

    /// Convert a failure from a mutating store call
    ///
    /// An unreachable store stays `StoreUnavailable`; a missing target
    /// document becomes `NotFound`; anything else is a rejected write.
    pub fn from_store_write(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => Error::StoreUnavailable(err),
            StoreError::MissingDocument { .. } => Error::NotFound(err.to_string()),
            _ => Error::StoreWriteFailed(err),
        }
    }

    /// Cancellation is success-of-intent and is never shown to the user
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type for note, sharing and shift operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_classification() {
        let offline = Error::from_store_write(StoreError::Unavailable("offline".into()));
        assert!(matches!(offline, Error::StoreUnavailable(_)));

        let missing = Error::from_store_write(StoreError::MissingDocument {
            collection: "notes",
            id: "n1".into(),
        });
        assert!(matches!(missing, Error::NotFound(_)));

        let rejected = Error::from_store_write(StoreError::WriteRejected("quota".into()));
        assert!(matches!(rejected, Error::StoreWriteFailed(_)));
    }

    #[test]
    fn test_only_cancellation_is_silent() {
        assert!(Error::Cancelled.is_silent());
        assert!(!Error::NotFound("x".into()).is_silent());
    }

    #[test]
    fn test_error_display_keeps_cause() {
        let err = Error::from_store_read(StoreError::Unavailable("connection reset".into()));
        assert!(err.to_string().contains("connection reset"));
    }
}
