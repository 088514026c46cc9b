//! Error types for the codec.

use crate::value::ValueKind;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding index values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A value was encoded against a kind it does not have.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The kind the caller declared.
        expected: ValueKind,
        /// The kind the value actually has.
        actual: ValueKind,
    },

    /// An encoded value has the wrong length for its kind.
    #[error("invalid encoded length for {kind}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// The kind being decoded.
        kind: ValueKind,
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// An encoded text value is not valid UTF-8.
    #[error("encoded text value is not valid UTF-8")]
    InvalidUtf8,

    /// An unknown kind tag was read from persisted data.
    #[error("unknown value kind tag: {tag}")]
    UnknownKind {
        /// The tag byte that was read.
        tag: u8,
    },
}
