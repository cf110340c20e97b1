//! Error types for the Stratum library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`StratumError`] enum. Corruption-class errors (out-of-order dictionary
//! appends, regressing postings) abort the running operation; lock contention
//! is reported immediately and never retried internally.
//!
//! # Examples
//!
//! ```
//! use stratum::error::{StratumError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(StratumError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Stratum operations.
#[derive(Error, Debug)]
pub enum StratumError {
    /// I/O errors from the underlying byte store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-level errors that are not corruption (missing segments file, etc.)
    #[error("Index error: {0}")]
    Index(String),

    /// On-disk structures violate an ordering or format invariant.
    #[error("Index corruption: {0}")]
    Corruption(String),

    /// A document that is marked deleted was requested.
    #[error("Document {0} is deleted")]
    DeletedDocument(u32),

    /// The write lock is held by another writer.
    #[error("Index locked for write: {0}")]
    IndexLocked(String),

    /// A short-lived lock (commit lock) could not be obtained.
    #[error("Lock obtain failed: {0}")]
    LockObtainFailed(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Analysis-related errors (tokenization, filtering, etc.)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Invalid argument or configuration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation for the current state (e.g. writer already closed)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with StratumError.
pub type Result<T> = std::result::Result<T, StratumError>;

impl StratumError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        StratumError::Index(msg.into())
    }

    /// Create a new corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        StratumError::Corruption(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        StratumError::Storage(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        StratumError::Analysis(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        StratumError::InvalidArgument(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        StratumError::InvalidArgument(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        StratumError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        StratumError::Other(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        StratumError::Storage(format!("Not found: {}", msg.into()))
    }

    /// True for errors that indicate damaged index files.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StratumError::Corruption(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = StratumError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = StratumError::corruption("terms out of order");
        assert_eq!(error.to_string(), "Index corruption: terms out of order");
        assert!(error.is_corruption());

        let error = StratumError::DeletedDocument(7);
        assert_eq!(error.to_string(), "Document 7 is deleted");
        assert!(!error.is_corruption());

        let error = StratumError::IndexLocked("write".to_string());
        assert_eq!(error.to_string(), "Index locked for write: write");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let stratum_error = StratumError::from(io_error);

        match stratum_error {
            StratumError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }
    }
}
