//! Store error handling
//!
//! Typed errors for the document store layer with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in a document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing service could not be reached
    #[error("Store unreachable: {0}")]
    Unavailable(String),

    /// The backing service refused a write
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// An update targeted a document that does not exist
    #[error("No document '{id}' in {collection}")]
    MissingDocument { collection: &'static str, id: String },

    /// A stored record could not be decoded
    #[error("Invalid record '{id}': {details}")]
    InvalidRecord { id: String, details: String },

    /// Failed to create the data directory for the database
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    /// Check if this error is transient (retrying may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::Unavailable(_) => Some("Check your connection and try again."),
            StoreError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StoreError::InvalidRecord { .. } => {
                Some("The stored record is damaged. Delete and recreate it.")
            }
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
