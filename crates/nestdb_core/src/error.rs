//! Error types for NestDB core.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by collections, queries and the database facade.
#[derive(Debug, Error)]
pub enum Error {
    /// A value's runtime type disagrees with a declared index type.
    ///
    /// Non-fatal while indexing a record (the record simply does not
    /// participate in that index); fatal when a filter value is
    /// executed against an index of another type.
    #[error(transparent)]
    Codec(#[from] nestdb_codec::CodecError),

    /// Record or revision absent.
    #[error("not found: {id}")]
    NotFound {
        /// The record id that was looked up.
        id: String,
    },

    /// An index with this name already exists on the collection.
    #[error("duplicate index: {name}")]
    DuplicateIndex {
        /// Name of the index.
        name: String,
    },

    /// No index with this name exists on the collection.
    #[error("unknown index: {name}")]
    UnknownIndex {
        /// Name of the index.
        name: String,
    },

    /// Rollback asked for a revision beyond the stored history.
    #[error("revision {requested} out of range: {stored} revisions stored")]
    RevisionOutOfRange {
        /// The revision offset requested.
        requested: usize,
        /// How many revisions are stored.
        stored: usize,
    },

    /// The query deadline passed before all workers finished.
    #[error("query timed out")]
    Timeout,

    /// The query was canceled, typically because the database is
    /// closing.
    #[error("query canceled")]
    Canceled,

    /// A stored reference record, id list or manifest failed to decode.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of what failed to decode.
        message: String,
    },

    /// The underlying KV engine failed.
    #[error("engine error: {0}")]
    Engine(#[from] nestdb_kv::KvError),

    /// A record failed to serialize to or deserialize from JSON.
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A selector was constructed with an empty field path.
    #[error("invalid selector: {message}")]
    InvalidSelector {
        /// Description of the problem.
        message: String,
    },
}

impl Error {
    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid-selector error.
    pub fn invalid_selector(message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            message: message.into(),
        }
    }
}
