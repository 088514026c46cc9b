//! In-memory engine with copy-on-write snapshot buckets.
//!
//! State is a map from bucket name to an `Arc`'d ordered map. Read
//! transactions clone the outer table (cheap: one `Arc` per bucket) and
//! keep reading it untouched. The single write transaction clones only
//! the buckets it mutates and publishes the new table atomically at
//! commit, so readers never observe partial writes.

use crate::engine::{Bucket, BucketMut, Cursor, Engine, ReadTx, WriteTx};
use crate::error::{KvError, KvResult};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type BucketData = Arc<BTreeMap<Vec<u8>, Vec<u8>>>;
pub(crate) type State = BTreeMap<String, BucketData>;

/// A mutation recorded by a write transaction, in application order.
///
/// The in-memory engine ignores the log (the copy-on-write buckets are
/// authoritative); the file engine serializes it into the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    CreateBucket {
        bucket: String,
    },
    DropBucket {
        bucket: String,
    },
    Put {
        bucket: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        bucket: String,
        key: Vec<u8>,
    },
}

/// Engine state shared between the memory and file engines.
#[derive(Debug)]
pub(crate) struct Shared {
    state: RwLock<Arc<State>>,
    writer: Mutex<()>,
    lock_timeout: Option<Duration>,
}

impl Shared {
    pub(crate) fn new(state: State, lock_timeout: Option<Duration>) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            lock_timeout,
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<State> {
        Arc::clone(&self.state.read())
    }

    pub(crate) fn begin_write(&self) -> KvResult<WriteInner<'_>> {
        let guard = match self.lock_timeout {
            Some(timeout) => self.writer.try_lock_for(timeout).ok_or(KvError::Busy)?,
            None => self.writer.lock(),
        };
        let base = self.snapshot();
        Ok(WriteInner {
            shared: self,
            _guard: guard,
            base,
            dirty: BTreeMap::new(),
            ops: Vec::new(),
        })
    }
}

/// The body of a write transaction, shared by both engines.
pub(crate) struct WriteInner<'a> {
    shared: &'a Shared,
    _guard: MutexGuard<'a, ()>,
    base: Arc<State>,
    /// Touched buckets; `None` marks a dropped bucket.
    dirty: BTreeMap<String, Option<BucketData>>,
    ops: Vec<Op>,
}

impl WriteInner<'_> {
    fn exists(&self, name: &str) -> bool {
        match self.dirty.get(name) {
            Some(slot) => slot.is_some(),
            None => self.base.contains_key(name),
        }
    }

    fn resolve(&self, name: &str) -> Option<BucketData> {
        match self.dirty.get(name) {
            Some(slot) => slot.clone(),
            None => self.base.get(name).cloned(),
        }
    }

    pub(crate) fn read_bucket(&self, name: &str) -> Option<Box<dyn Bucket + '_>> {
        self.resolve(name)
            .map(|data| Box::new(MemBucket { data }) as Box<dyn Bucket>)
    }

    pub(crate) fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .base
            .keys()
            .filter(|name| self.exists(name))
            .cloned()
            .collect();
        for (name, slot) in &self.dirty {
            if slot.is_some() && !self.base.contains_key(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    pub(crate) fn create_bucket(&mut self, name: &str) {
        if !self.exists(name) {
            self.dirty
                .insert(name.to_owned(), Some(Arc::new(BTreeMap::new())));
            self.ops.push(Op::CreateBucket {
                bucket: name.to_owned(),
            });
        }
    }

    pub(crate) fn drop_bucket(&mut self, name: &str) -> bool {
        let existed = self.exists(name);
        if existed {
            self.dirty.insert(name.to_owned(), None);
            self.ops.push(Op::DropBucket {
                bucket: name.to_owned(),
            });
        }
        existed
    }

    pub(crate) fn bucket_mut(&mut self, name: &str) -> Option<Box<dyn BucketMut + '_>> {
        if !self.dirty.contains_key(name) {
            let data = self.base.get(name)?.clone();
            self.dirty.insert(name.to_owned(), Some(data));
        }
        match self.dirty.get_mut(name) {
            Some(Some(data)) => Some(Box::new(MemBucketMut {
                bucket: name.to_owned(),
                map: Arc::make_mut(data),
                ops: &mut self.ops,
            })),
            _ => None,
        }
    }

    pub(crate) fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Publishes the dirty buckets into the shared state.
    pub(crate) fn apply(self) {
        let mut next: State = (*self.base).clone();
        for (name, slot) in self.dirty {
            match slot {
                Some(data) => {
                    next.insert(name, data);
                }
                None => {
                    next.remove(&name);
                }
            }
        }
        *self.shared.state.write() = Arc::new(next);
    }
}

/// In-memory engine.
pub struct MemoryEngine {
    shared: Shared,
}

impl MemoryEngine {
    /// Creates an empty in-memory engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Shared::new(State::new(), None),
        }
    }

    /// Creates an empty engine whose write transactions fail with
    /// [`KvError::Busy`] instead of blocking indefinitely.
    #[must_use]
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            shared: Shared::new(State::new(), Some(timeout)),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn begin_read(&self) -> KvResult<Box<dyn ReadTx + Send + Sync + '_>> {
        Ok(Box::new(MemReadTx {
            state: self.shared.snapshot(),
        }))
    }

    fn begin_write(&self) -> KvResult<Box<dyn WriteTx + '_>> {
        Ok(Box::new(MemWriteTx {
            inner: self.shared.begin_write()?,
        }))
    }
}

pub(crate) struct MemReadTx {
    state: Arc<State>,
}

impl ReadTx for MemReadTx {
    fn bucket(&self, name: &str) -> Option<Box<dyn Bucket + '_>> {
        self.state
            .get(name)
            .map(|data| Box::new(MemBucket { data: data.clone() }) as Box<dyn Bucket>)
    }

    fn bucket_names(&self) -> Vec<String> {
        self.state.keys().cloned().collect()
    }
}

struct MemWriteTx<'a> {
    inner: WriteInner<'a>,
}

impl ReadTx for MemWriteTx<'_> {
    fn bucket(&self, name: &str) -> Option<Box<dyn Bucket + '_>> {
        self.inner.read_bucket(name)
    }

    fn bucket_names(&self) -> Vec<String> {
        self.inner.bucket_names()
    }
}

impl WriteTx for MemWriteTx<'_> {
    fn create_bucket(&mut self, name: &str) -> KvResult<()> {
        self.inner.create_bucket(name);
        Ok(())
    }

    fn drop_bucket(&mut self, name: &str) -> KvResult<bool> {
        Ok(self.inner.drop_bucket(name))
    }

    fn bucket_mut(&mut self, name: &str) -> Option<Box<dyn BucketMut + '_>> {
        self.inner.bucket_mut(name)
    }

    fn as_read(&self) -> &dyn ReadTx {
        self
    }

    fn commit(self: Box<Self>) -> KvResult<()> {
        self.inner.apply();
        Ok(())
    }

    fn rollback(self: Box<Self>) {}
}

pub(crate) struct MemBucket {
    data: BucketData,
}

impl MemBucket {
    pub(crate) fn new(data: BucketData) -> Self {
        Self { data }
    }
}

impl Bucket for MemBucket {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        Box::new(MemCursor {
            data: self.data.clone(),
            pos: Position::Unpositioned,
        })
    }
}

struct MemBucketMut<'a> {
    bucket: String,
    map: &'a mut BTreeMap<Vec<u8>, Vec<u8>>,
    ops: &'a mut Vec<Op>,
}

impl BucketMut for MemBucketMut<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.map.insert(key.to_vec(), value.to_vec());
        self.ops.push(Op::Put {
            bucket: self.bucket.clone(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        let removed = self.map.remove(key).is_some();
        if removed {
            self.ops.push(Op::Delete {
                bucket: self.bucket.clone(),
                key: key.to_vec(),
            });
        }
        removed
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        // Snapshot of the bucket as of this point in the transaction.
        Box::new(MemCursor {
            data: Arc::new(self.map.clone()),
            pos: Position::Unpositioned,
        })
    }
}

enum Position {
    Unpositioned,
    At(Vec<u8>),
    BeforeStart,
    AfterEnd,
}

struct MemCursor {
    data: BucketData,
    pos: Position,
}

impl MemCursor {
    fn land(
        &mut self,
        entry: Option<(Vec<u8>, Vec<u8>)>,
        towards_end: bool,
    ) -> Option<(Vec<u8>, Vec<u8>)> {
        match entry {
            Some((key, value)) => {
                self.pos = Position::At(key.clone());
                Some((key, value))
            }
            None => {
                self.pos = if towards_end {
                    Position::AfterEnd
                } else {
                    Position::BeforeStart
                };
                None
            }
        }
    }
}

fn cloned(entry: Option<(&Vec<u8>, &Vec<u8>)>) -> Option<(Vec<u8>, Vec<u8>)> {
    entry.map(|(key, value)| (key.clone(), value.clone()))
}

impl Cursor for MemCursor {
    fn seek(&mut self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = cloned(
            self.data
                .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
                .next(),
        );
        self.land(entry, true)
    }

    fn first(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = cloned(self.data.iter().next());
        self.land(entry, true)
    }

    fn last(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = cloned(self.data.iter().next_back());
        self.land(entry, false)
    }

    fn next(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = match &self.pos {
            Position::Unpositioned | Position::BeforeStart => cloned(self.data.iter().next()),
            Position::At(k) => cloned(
                self.data
                    .range::<[u8], _>((Bound::Excluded(k.as_slice()), Bound::Unbounded))
                    .next(),
            ),
            Position::AfterEnd => None,
        };
        self.land(entry, true)
    }

    fn prev(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = match &self.pos {
            Position::Unpositioned | Position::AfterEnd => cloned(self.data.iter().next_back()),
            Position::At(k) => cloned(
                self.data
                    .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(k.as_slice())))
                    .next_back(),
            ),
            Position::BeforeStart => None,
        };
        self.land(entry, false)
    }
}
