//! Engine, transaction, bucket and cursor traits.
//!
//! NestDB core treats the storage engine as an interface: an ordered
//! key/value store with named buckets, bidirectional cursors, and
//! serializable read/write transactions. The built-in engines implement
//! this contract; an embedder can supply another.

use crate::error::KvResult;

/// An ordered, transactional key/value engine.
///
/// # Transaction discipline
///
/// - Any number of read transactions may run concurrently; each sees a
///   consistent snapshot taken at `begin_read`.
/// - At most one write transaction exists at a time; its effects become
///   visible atomically at `commit` and never before.
pub trait Engine: Send + Sync {
    /// Begins a read-only snapshot transaction.
    ///
    /// The returned transaction is `Send + Sync` so a single snapshot
    /// can back concurrent query workers.
    fn begin_read(&self) -> KvResult<Box<dyn ReadTx + Send + Sync + '_>>;

    /// Begins a write transaction, blocking until the writer slot is
    /// free (or failing with [`crate::KvError::Busy`] when the engine
    /// was configured with a lock timeout).
    fn begin_write(&self) -> KvResult<Box<dyn WriteTx + '_>>;
}

/// A read-only view of the store.
///
/// Dropping a read transaction releases it; there is nothing to roll
/// back.
pub trait ReadTx {
    /// Returns the bucket with the given name, or `None` if it does not
    /// exist in this transaction's view.
    fn bucket(&self, name: &str) -> Option<Box<dyn Bucket + '_>>;

    /// Returns the names of all buckets in this transaction's view, in
    /// lexicographic order.
    fn bucket_names(&self) -> Vec<String>;
}

/// A read/write transaction.
///
/// Dropping a write transaction without calling [`WriteTx::commit`]
/// discards all of its changes.
pub trait WriteTx: ReadTx {
    /// Creates the bucket if it does not already exist.
    fn create_bucket(&mut self, name: &str) -> KvResult<()>;

    /// Drops the bucket and everything in it. Returns whether the
    /// bucket existed.
    fn drop_bucket(&mut self, name: &str) -> KvResult<bool>;

    /// Returns a mutable handle to the bucket, or `None` if it does not
    /// exist.
    fn bucket_mut(&mut self, name: &str) -> Option<Box<dyn BucketMut + '_>>;

    /// Upcasts to the read-only view, for code shared with read paths.
    fn as_read(&self) -> &dyn ReadTx;

    /// Atomically publishes all changes made in this transaction.
    fn commit(self: Box<Self>) -> KvResult<()>;

    /// Discards all changes made in this transaction.
    fn rollback(self: Box<Self>);
}

/// A read-only bucket: an ordered map from byte keys to byte values.
pub trait Bucket {
    /// Returns the value stored at `key`.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Returns the number of keys in the bucket.
    fn len(&self) -> usize;

    /// Returns true if the bucket holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a cursor over the bucket.
    fn cursor(&self) -> Box<dyn Cursor>;
}

/// A mutable bucket handle.
pub trait BucketMut {
    /// Returns the value stored at `key`.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Stores `value` at `key`, replacing any existing value.
    fn put(&mut self, key: &[u8], value: &[u8]);

    /// Removes `key`. Returns whether it was present.
    fn delete(&mut self, key: &[u8]) -> bool;

    /// Opens a cursor over the bucket as of this point in the
    /// transaction.
    fn cursor(&self) -> Box<dyn Cursor>;
}

/// A bidirectional cursor over an ordered bucket.
///
/// All positioning methods return the entry the cursor lands on, or
/// `None` when it moves past either end.
///
/// # Seek semantics
///
/// `seek(key)` positions at the first key greater than or equal to
/// `key`. When no such key exists the cursor parks past the end, from
/// where `prev` yields the last entry. This is what makes reverse
/// iteration from a missing key start at its immediate predecessor.
pub trait Cursor {
    /// Positions at the first key `>= key`.
    fn seek(&mut self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Positions at the first entry.
    fn first(&mut self) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Positions at the last entry.
    fn last(&mut self) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Advances to the next entry.
    fn next(&mut self) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Steps back to the previous entry.
    fn prev(&mut self) -> Option<(Vec<u8>, Vec<u8>)>;
}
