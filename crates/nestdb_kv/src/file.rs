//! File-backed engine.
//!
//! Layout of the database directory:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK           # advisory lock for single-process access
//! └─ journal.nkv    # append-only journal of committed write batches
//! ```
//!
//! The full bucket state lives in memory; every committed write
//! transaction appends one journal record before it is published, and the
//! journal is replayed on open. A record is an envelope of magic bytes,
//! format version, payload length, the encoded operations, and a CRC-32
//! over everything before it. Replay stops cleanly at a torn tail (the
//! file is truncated back to the last complete record); a checksum
//! mismatch on a complete record is corruption and fails the open.

use crate::engine::{Bucket, BucketMut, Engine, ReadTx, WriteTx};
use crate::error::{KvError, KvResult};
use crate::memory::{Op, Shared, State, WriteInner};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Magic bytes identifying a journal record.
const JOURNAL_MAGIC: [u8; 4] = *b"NKVJ";

/// Current journal format version.
const JOURNAL_VERSION: u16 = 1;

/// Envelope size before the payload: magic (4) + version (2) + length (4).
const HEADER_SIZE: usize = 10;

/// CRC size.
const CRC_SIZE: usize = 4;

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.nkv";

/// Operation tags within a journal payload.
const OP_CREATE_BUCKET: u8 = 1;
const OP_DROP_BUCKET: u8 = 2;
const OP_PUT: u8 = 3;
const OP_DELETE: u8 = 4;

/// File-backed engine: in-memory buckets plus a journal for durability.
#[derive(Debug)]
pub struct FileEngine {
    shared: Shared,
    journal: Mutex<File>,
    sync_on_commit: bool,
    _lock_file: File,
}

impl FileEngine {
    /// Opens or creates a database directory with default settings
    /// (fsync on every commit, no write-lock timeout).
    pub fn open(path: &Path) -> KvResult<Self> {
        Self::open_with(path, true, None)
    }

    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Locked`] when another process holds the
    /// directory lock, [`KvError::Corruption`] when the journal fails
    /// its checksums, or an I/O error.
    pub fn open_with(
        path: &Path,
        sync_on_commit: bool,
        lock_timeout: Option<Duration>,
    ) -> KvResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(KvError::Locked);
        }

        let mut journal = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(JOURNAL_FILE))?;

        let mut data = Vec::new();
        journal.read_to_end(&mut data)?;
        let (state, valid_len) = replay(&data)?;
        if (valid_len as usize) < data.len() {
            // Torn tail from an interrupted append.
            journal.set_len(valid_len)?;
        }
        journal.seek(SeekFrom::Start(valid_len))?;

        Ok(Self {
            shared: Shared::new(state, lock_timeout),
            journal: Mutex::new(journal),
            sync_on_commit,
            _lock_file: lock_file,
        })
    }

    fn append_batch(&self, ops: &[Op]) -> KvResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let payload = encode_ops(ops);

        let mut record = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        record.extend_from_slice(&JOURNAL_MAGIC);
        record.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        let len = u32::try_from(payload.len())
            .map_err(|_| KvError::corruption("journal batch exceeds 4 GiB"))?;
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&payload);
        let crc = compute_crc32(&record);
        record.extend_from_slice(&crc.to_le_bytes());

        let mut journal = self.journal.lock();
        journal.write_all(&record)?;
        if self.sync_on_commit {
            journal.sync_data()?;
        }
        Ok(())
    }
}

impl Engine for FileEngine {
    fn begin_read(&self) -> KvResult<Box<dyn ReadTx + Send + Sync + '_>> {
        Ok(Box::new(FileReadTx {
            state: self.shared.snapshot(),
        }))
    }

    fn begin_write(&self) -> KvResult<Box<dyn WriteTx + '_>> {
        Ok(Box::new(FileWriteTx {
            inner: self.shared.begin_write()?,
            engine: self,
        }))
    }
}

struct FileReadTx {
    state: Arc<State>,
}

impl ReadTx for FileReadTx {
    fn bucket(&self, name: &str) -> Option<Box<dyn Bucket + '_>> {
        self.state
            .get(name)
            .map(|data| Box::new(crate::memory::MemBucket::new(data.clone())) as Box<dyn Bucket>)
    }

    fn bucket_names(&self) -> Vec<String> {
        self.state.keys().cloned().collect()
    }
}

struct FileWriteTx<'a> {
    inner: WriteInner<'a>,
    engine: &'a FileEngine,
}

impl ReadTx for FileWriteTx<'_> {
    fn bucket(&self, name: &str) -> Option<Box<dyn Bucket + '_>> {
        self.inner.read_bucket(name)
    }

    fn bucket_names(&self) -> Vec<String> {
        self.inner.bucket_names()
    }
}

impl WriteTx for FileWriteTx<'_> {
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
        // Journal first: if the append fails the in-memory state is
        // untouched and the transaction is simply lost.
        self.engine.append_batch(self.inner.ops())?;
        self.inner.apply();
        Ok(())
    }

    fn rollback(self: Box<Self>) {}
}

fn encode_ops(ops: &[Op]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(ops.len() as u32).to_le_bytes());
    for op in ops {
        match op {
            Op::CreateBucket { bucket } => {
                buf.push(OP_CREATE_BUCKET);
                put_bytes(&mut buf, bucket.as_bytes());
            }
            Op::DropBucket { bucket } => {
                buf.push(OP_DROP_BUCKET);
                put_bytes(&mut buf, bucket.as_bytes());
            }
            Op::Put { bucket, key, value } => {
                buf.push(OP_PUT);
                put_bytes(&mut buf, bucket.as_bytes());
                put_bytes(&mut buf, key);
                put_bytes(&mut buf, value);
            }
            Op::Delete { bucket, key } => {
                buf.push(OP_DELETE);
                put_bytes(&mut buf, bucket.as_bytes());
                put_bytes(&mut buf, key);
            }
        }
    }
    buf
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn read_u8(&mut self) -> KvResult<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| KvError::corruption("journal payload truncated"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self) -> KvResult<u32> {
        let end = self.pos + 4;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| KvError::corruption("journal payload truncated"))?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
    }

    fn bytes(&mut self) -> KvResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        let end = self.pos + len;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| KvError::corruption("journal payload truncated"))?;
        self.pos = end;
        Ok(slice)
    }

    fn string(&mut self) -> KvResult<String> {
        String::from_utf8(self.bytes()?.to_vec())
            .map_err(|_| KvError::corruption("journal bucket name is not UTF-8"))
    }
}

fn decode_ops(payload: &[u8]) -> KvResult<Vec<Op>> {
    let mut reader = PayloadReader {
        data: payload,
        pos: 0,
    };
    let count = reader.read_u32()?;
    let mut ops = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let op = match reader.read_u8()? {
            OP_CREATE_BUCKET => Op::CreateBucket {
                bucket: reader.string()?,
            },
            OP_DROP_BUCKET => Op::DropBucket {
                bucket: reader.string()?,
            },
            OP_PUT => Op::Put {
                bucket: reader.string()?,
                key: reader.bytes()?.to_vec(),
                value: reader.bytes()?.to_vec(),
            },
            OP_DELETE => Op::Delete {
                bucket: reader.string()?,
                key: reader.bytes()?.to_vec(),
            },
            tag => return Err(KvError::corruption(format!("unknown journal op tag {tag}"))),
        };
        ops.push(op);
    }
    Ok(ops)
}

/// Replays the journal into a fresh state.
///
/// Returns the state and the offset of the last complete record, so a
/// torn tail can be truncated away.
fn replay(data: &[u8]) -> KvResult<(State, u64)> {
    let mut state = State::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = &data[offset..];
        if remaining.len() < HEADER_SIZE + CRC_SIZE {
            break; // torn header
        }
        if remaining[..4] != JOURNAL_MAGIC {
            return Err(KvError::corruption("bad journal magic"));
        }
        let version = u16::from_le_bytes([remaining[4], remaining[5]]);
        if version != JOURNAL_VERSION {
            return Err(KvError::corruption(format!(
                "unsupported journal version {version}"
            )));
        }
        let len = u32::from_le_bytes([remaining[6], remaining[7], remaining[8], remaining[9]])
            as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if remaining.len() < total {
            break; // torn payload
        }

        let stored_crc = u32::from_le_bytes(
            remaining[HEADER_SIZE + len..total]
                .try_into()
                .expect("4-byte slice"),
        );
        let actual_crc = compute_crc32(&remaining[..HEADER_SIZE + len]);
        if stored_crc != actual_crc {
            return Err(KvError::corruption(format!(
                "journal checksum mismatch: expected {stored_crc:08x}, got {actual_crc:08x}"
            )));
        }

        let ops = decode_ops(&remaining[HEADER_SIZE..HEADER_SIZE + len])?;
        for op in ops {
            apply_op(&mut state, op);
        }
        offset += total;
    }

    Ok((state, offset as u64))
}

fn apply_op(state: &mut State, op: Op) {
    match op {
        Op::CreateBucket { bucket } => {
            state.entry(bucket).or_insert_with(|| Arc::new(BTreeMap::new()));
        }
        Op::DropBucket { bucket } => {
            state.remove(&bucket);
        }
        Op::Put { bucket, key, value } => {
            let data = state.entry(bucket).or_insert_with(|| Arc::new(BTreeMap::new()));
            Arc::make_mut(data).insert(key, value);
        }
        Op::Delete { bucket, key } => {
            if let Some(data) = state.get_mut(&bucket) {
                Arc::make_mut(data).remove(&key);
            }
        }
    }
}

/// CRC-32 (IEEE polynomial) over the given bytes.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_entry(engine: &FileEngine, bucket: &str, key: &[u8], value: &[u8]) {
        let mut tx = engine.begin_write().unwrap();
        tx.create_bucket(bucket).unwrap();
        tx.bucket_mut(bucket).unwrap().put(key, value);
        tx.commit().unwrap();
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            write_entry(&engine, "b", b"k1", b"v1");
            write_entry(&engine, "b", b"k2", b"v2");

            let mut tx = engine.begin_write().unwrap();
            tx.bucket_mut("b").unwrap().delete(b"k1");
            tx.commit().unwrap();
        }

        let engine = FileEngine::open(dir.path()).unwrap();
        let tx = engine.begin_read().unwrap();
        let bucket = tx.bucket("b").unwrap();
        assert_eq!(bucket.get(b"k1"), None);
        assert_eq!(bucket.get(b"k2"), Some(b"v2".to_vec()));
    }

    #[test]
    fn dropped_bucket_stays_dropped() {
        let dir = TempDir::new().unwrap();

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            write_entry(&engine, "b", b"k", b"v");
            let mut tx = engine.begin_write().unwrap();
            tx.drop_bucket("b").unwrap();
            tx.commit().unwrap();
        }

        let engine = FileEngine::open(dir.path()).unwrap();
        let tx = engine.begin_read().unwrap();
        assert!(tx.bucket("b").is_none());
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let _engine = FileEngine::open(dir.path()).unwrap();

        match FileEngine::open(dir.path()) {
            Err(KvError::Locked) => {}
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            write_entry(&engine, "b", b"k", b"v");
        }

        // Simulate a crash mid-append.
        let journal_path = dir.path().join(JOURNAL_FILE);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&journal_path)
            .unwrap();
        file.write_all(&JOURNAL_MAGIC).unwrap();
        file.write_all(&JOURNAL_VERSION.to_le_bytes()).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(b"partial").unwrap();
        drop(file);

        let engine = FileEngine::open(dir.path()).unwrap();
        let tx = engine.begin_read().unwrap();
        assert_eq!(tx.bucket("b").unwrap().get(b"k"), Some(b"v".to_vec()));
        drop(tx);

        // The tail was cut; further writes land on a clean journal.
        write_entry(&engine, "b", b"k2", b"v2");
        drop(engine);

        let engine = FileEngine::open(dir.path()).unwrap();
        let tx = engine.begin_read().unwrap();
        assert_eq!(tx.bucket("b").unwrap().get(b"k2"), Some(b"v2".to_vec()));
    }

    #[test]
    fn corrupt_record_fails_open() {
        let dir = TempDir::new().unwrap();

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            write_entry(&engine, "b", b"k", b"v");
        }

        // Flip a payload byte of the complete record.
        let journal_path = dir.path().join(JOURNAL_FILE);
        let mut data = fs::read(&journal_path).unwrap();
        let mid = HEADER_SIZE + 2;
        data[mid] ^= 0xff;
        fs::write(&journal_path, &data).unwrap();

        match FileEngine::open(dir.path()) {
            Err(KvError::Corruption { .. }) => {}
            other => panic!("expected Corruption, got {other:?}"),
        }
    }

    #[test]
    fn empty_commit_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();

        let tx = engine.begin_write().unwrap();
        tx.commit().unwrap();

        let len = fs::metadata(dir.path().join(JOURNAL_FILE)).unwrap().len();
        assert_eq!(len, 0);
    }

    #[test]
    fn crc32_known_values() {
        // Reference value for "123456789" under the IEEE polynomial.
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
