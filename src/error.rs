//! Error types for the store and its write-ahead log.
//!
//! Missing keys are not errors: `get` returns `None` and deleting an absent
//! key succeeds. Everything below is a real failure the caller must see.

use thiserror::Error;

/// Errors returned by [`Store`](crate::Store) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening, writing, syncing or truncating the log file failed.
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized (e.g. a map with non-string keys).
    #[error("failed to encode record for key {key:?}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record before the end of the log is malformed.
    #[error("corrupt log record at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The store has been closed (or is closing).
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Returns true for errors after which retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
