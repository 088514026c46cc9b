//! Versioned record storage.
//!
//! Each record keeps a bounded FIFO of revisions in its own bucket,
//! keyed by a big-endian monotonic timestamp so the latest revision is
//! one cursor step and the Nth previous is N steps. Only the live
//! revision is indexed; history is read-only until a rollback re-puts
//! it.

use crate::error::{Error, Result};
use crate::layout;
use nestdb_kv::{ReadTx, WriteTx};

/// Revision bookkeeping for one collection.
#[derive(Debug, Clone)]
pub(crate) struct RevisionStore {
    collection: String,
}

impl RevisionStore {
    pub(crate) fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_owned(),
        }
    }

    fn bucket_name(&self, id: &str) -> String {
        layout::revisions_bucket(&self.collection, id)
    }

    /// Draws the next revision timestamp from the collection's counter.
    pub(crate) fn next_timestamp(&self, tx: &mut dyn WriteTx) -> Result<u64> {
        let meta = layout::meta_bucket(&self.collection);
        tx.create_bucket(&meta)?;
        let mut bucket = tx
            .bucket_mut(&meta)
            .ok_or_else(|| Error::corruption(format!("meta bucket {meta} missing")))?;

        let next = match bucket.get(layout::REVISION_SEQ_KEY) {
            Some(raw) => {
                let arr: [u8; 8] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::corruption("revision counter is malformed"))?;
                u64::from_le_bytes(arr) + 1
            }
            None => 0,
        };
        bucket.put(layout::REVISION_SEQ_KEY, &next.to_le_bytes());
        Ok(next)
    }

    /// Appends a revision and discards the eldest beyond `depth`.
    pub(crate) fn append(
        &self,
        tx: &mut dyn WriteTx,
        id: &str,
        timestamp: u64,
        payload: &[u8],
        depth: usize,
    ) -> Result<()> {
        let name = self.bucket_name(id);
        tx.create_bucket(&name)?;
        let mut bucket = tx
            .bucket_mut(&name)
            .ok_or_else(|| Error::corruption(format!("revision bucket {name} missing")))?;

        bucket.put(&timestamp.to_be_bytes(), payload);

        // FIFO bound: walk from the eldest end.
        let mut excess = bucket_len(&*bucket).saturating_sub(depth);
        if excess > 0 {
            let mut cursor = bucket.cursor();
            let mut entry = cursor.first();
            while excess > 0 {
                let Some((key, _)) = entry else { break };
                bucket.delete(&key);
                entry = cursor.next();
                excess -= 1;
            }
        }
        Ok(())
    }

    /// Reads the revision `n` steps before the latest.
    ///
    /// `n = 0` is the live revision. Fails with [`Error::NotFound`]
    /// when the record has no revisions or `n` exceeds the stored
    /// history.
    pub(crate) fn get(&self, tx: &dyn ReadTx, id: &str, n: usize) -> Result<(u64, Vec<u8>)> {
        let bucket = tx
            .bucket(&self.bucket_name(id))
            .ok_or_else(|| Error::not_found(id))?;

        let mut cursor = bucket.cursor();
        let mut entry = cursor.last();
        for _ in 0..n {
            entry = cursor.prev();
        }
        let (key, payload) = entry.ok_or_else(|| Error::not_found(id))?;
        let arr: [u8; 8] = key
            .as_slice()
            .try_into()
            .map_err(|_| Error::corruption("revision key is malformed"))?;
        Ok((u64::from_be_bytes(arr), payload))
    }

    /// Number of stored revisions for `id`.
    pub(crate) fn count(&self, tx: &dyn ReadTx, id: &str) -> usize {
        tx.bucket(&self.bucket_name(id))
            .map_or(0, |bucket| bucket.len())
    }

    /// Removes all revisions of `id`.
    pub(crate) fn delete_all(&self, tx: &mut dyn WriteTx, id: &str) -> Result<()> {
        tx.drop_bucket(&self.bucket_name(id))?;
        Ok(())
    }
}

fn bucket_len(bucket: &dyn nestdb_kv::BucketMut) -> usize {
    // BucketMut has no len; count via a cursor walk. Revision buckets
    // are bounded by the configured depth, so this stays small.
    let mut cursor = bucket.cursor();
    let mut count = 0;
    let mut entry = cursor.first();
    while entry.is_some() {
        count += 1;
        entry = cursor.next();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestdb_kv::{Engine, MemoryEngine};

    fn append_n(engine: &MemoryEngine, store: &RevisionStore, id: &str, payloads: &[&[u8]], depth: usize) {
        let mut tx = engine.begin_write().unwrap();
        for payload in payloads {
            let ts = store.next_timestamp(&mut *tx).unwrap();
            store.append(&mut *tx, id, ts, payload, depth).unwrap();
        }
        tx.commit().unwrap();
    }

    #[test]
    fn latest_and_nth_previous() {
        let engine = MemoryEngine::new();
        let store = RevisionStore::new("users");
        append_n(&engine, &store, "1", &[b"a", b"b", b"c"], 10);

        let tx = engine.begin_read().unwrap();
        assert_eq!(store.get(&*tx, "1", 0).unwrap().1, b"c".to_vec());
        assert_eq!(store.get(&*tx, "1", 1).unwrap().1, b"b".to_vec());
        assert_eq!(store.get(&*tx, "1", 2).unwrap().1, b"a".to_vec());
        assert!(matches!(
            store.get(&*tx, "1", 3),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn timestamps_are_monotonic() {
        let engine = MemoryEngine::new();
        let store = RevisionStore::new("users");
        append_n(&engine, &store, "1", &[b"a"], 10);
        append_n(&engine, &store, "2", &[b"b"], 10);
        append_n(&engine, &store, "1", &[b"c"], 10);

        let tx = engine.begin_read().unwrap();
        let (ts_first, _) = store.get(&*tx, "1", 1).unwrap();
        let (ts_other, _) = store.get(&*tx, "2", 0).unwrap();
        let (ts_last, _) = store.get(&*tx, "1", 0).unwrap();
        assert!(ts_first < ts_other);
        assert!(ts_other < ts_last);
    }

    #[test]
    fn fifo_discards_eldest() {
        let engine = MemoryEngine::new();
        let store = RevisionStore::new("users");
        append_n(&engine, &store, "1", &[b"a", b"b", b"c", b"d"], 3);

        let tx = engine.begin_read().unwrap();
        assert_eq!(store.count(&*tx, "1"), 3);
        assert_eq!(store.get(&*tx, "1", 2).unwrap().1, b"b".to_vec());
        assert!(store.get(&*tx, "1", 3).is_err());
    }

    #[test]
    fn missing_record_is_not_found() {
        let engine = MemoryEngine::new();
        let store = RevisionStore::new("users");

        let tx = engine.begin_read().unwrap();
        assert!(matches!(
            store.get(&*tx, "ghost", 0),
            Err(Error::NotFound { .. })
        ));
        assert_eq!(store.count(&*tx, "ghost"), 0);
    }

    #[test]
    fn delete_all_removes_history() {
        let engine = MemoryEngine::new();
        let store = RevisionStore::new("users");
        append_n(&engine, &store, "1", &[b"a", b"b"], 10);

        let mut tx = engine.begin_write().unwrap();
        store.delete_all(&mut *tx, "1").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        assert_eq!(store.count(&*tx, "1"), 0);
    }
}
