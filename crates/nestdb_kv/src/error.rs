//! Error types for the KV engine layer.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors that can occur in the KV engine layer.
#[derive(Debug, Error)]
pub enum KvError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted data failed to decode.
    #[error("journal corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    Locked,

    /// The write lock could not be acquired within the transaction timeout.
    #[error("write transaction timed out waiting for the write lock")]
    Busy,
}

impl KvError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}
