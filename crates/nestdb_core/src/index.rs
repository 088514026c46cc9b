//! Secondary indexes.
//!
//! An index owns one bucket mapping encoded indexed value to a sorted
//! id list. Point and range lookups return [`IdSet`]s annotated with
//! the value each id was found under.

use crate::error::{Error, Result};
use crate::extract::extract;
use crate::filter::Filter;
use crate::idset::{IdEntry, IdSet};
use crate::layout;
use crate::selector::{Selector, SelectorHash};
use nestdb_codec::{encode, Value, ValueKind};
use nestdb_kv::{ReadTx, WriteTx};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Declaration of a secondary index: a unique name, the scalar type it
/// indexes, and the field path it extracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name, unique within its collection.
    pub name: String,
    /// Declared scalar type.
    pub kind: ValueKind,
    /// Field path the index extracts from each record.
    pub selector: Selector,
}

/// A secondary index bound to its collection's bucket.
#[derive(Debug, Clone)]
pub(crate) struct Index {
    name: String,
    kind: ValueKind,
    selector: Selector,
    hash: SelectorHash,
    bucket: String,
}

/// Parameters of one bounded range scan.
pub(crate) struct RangeScan<'a> {
    /// Start of iteration; `None` scans from the applicable end.
    pub from: Option<&'a [u8]>,
    /// Bound at which iteration stops; `None` means unbounded.
    pub to: Option<&'a [u8]>,
    /// Whether a key equal to `from`/`to` is part of the result.
    pub inclusive: bool,
    /// Iteration direction.
    pub ascending: bool,
    /// Id cap; hitting it marks the result truncated.
    pub limit: usize,
    /// Query deadline.
    pub deadline: Option<Instant>,
    /// Set when the database is closing.
    pub cancel: Option<&'a AtomicBool>,
    /// Set when a sibling worker already failed.
    pub abort: Option<&'a AtomicBool>,
}

impl<'a> RangeScan<'a> {
    /// An unbounded ascending scan, for backfills and tests.
    pub(crate) fn full(limit: usize) -> Self {
        Self {
            from: None,
            to: None,
            inclusive: true,
            ascending: true,
            limit,
            deadline: None,
            cancel: None,
            abort: None,
        }
    }

    fn check_interrupts(&self) -> Result<()> {
        for flag in [self.cancel, self.abort].into_iter().flatten() {
            if flag.load(Ordering::Relaxed) {
                return Err(Error::Canceled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }
}

impl Index {
    pub(crate) fn new(collection: &str, def: IndexDefinition) -> Self {
        let hash = def.selector.hash();
        let bucket = layout::index_bucket(collection, &def.name);
        Self {
            name: def.name,
            kind: def.kind,
            selector: def.selector,
            hash,
            bucket,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> ValueKind {
        self.kind
    }

    pub(crate) fn selector_hash(&self) -> SelectorHash {
        self.hash
    }

    pub(crate) fn bucket_name(&self) -> &str {
        &self.bucket
    }

    pub(crate) fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            name: self.name.clone(),
            kind: self.kind,
            selector: self.selector.clone(),
        }
    }

    /// Extracts and encodes this index's value from a record.
    ///
    /// Returns `None` when the field is absent or its runtime type does
    /// not match the declared kind; the record then does not
    /// participate in this index, which is not an error.
    pub(crate) fn apply(&self, doc: &serde_json::Value) -> Option<Vec<u8>> {
        let node = extract(doc, &self.selector)?;
        let value = Value::from_json(self.kind, node)?;
        Some(encode(&value))
    }

    /// True iff the filter's selector equals this index's selector and
    /// at least one filter value has the declared kind.
    pub(crate) fn does_filter_apply(&self, filter: &Filter) -> bool {
        filter.selector() == &self.selector
            && filter.values().iter().any(|v| v.kind() == self.kind)
    }

    /// Adds `id` to the sorted id list at `value`. Idempotent per
    /// (value, id) pair.
    pub(crate) fn insert(&self, tx: &mut dyn WriteTx, value: &[u8], id: &str) -> Result<()> {
        tx.create_bucket(&self.bucket)?;
        let mut bucket = tx
            .bucket_mut(&self.bucket)
            .ok_or_else(|| Error::corruption(format!("index bucket {} missing", self.bucket)))?;

        let mut ids = match bucket.get(value) {
            Some(raw) => decode_id_list(&raw)?,
            None => Vec::new(),
        };
        if let Err(pos) = ids.binary_search_by(|existing| existing.as_str().cmp(id)) {
            ids.insert(pos, id.to_owned());
            bucket.put(value, &encode_id_list(&ids));
        }
        Ok(())
    }

    /// Removes `id` from the id list at `value`, deleting the key when
    /// the list becomes empty.
    pub(crate) fn remove(&self, tx: &mut dyn WriteTx, value: &[u8], id: &str) -> Result<()> {
        let Some(mut bucket) = tx.bucket_mut(&self.bucket) else {
            return Ok(());
        };
        let Some(raw) = bucket.get(value) else {
            return Ok(());
        };

        let mut ids = decode_id_list(&raw)?;
        if let Ok(pos) = ids.binary_search_by(|existing| existing.as_str().cmp(id)) {
            ids.remove(pos);
            if ids.is_empty() {
                bucket.delete(value);
            } else {
                bucket.put(value, &encode_id_list(&ids));
            }
        }
        Ok(())
    }

    /// Reads the id set at exactly `value`.
    pub(crate) fn lookup_equal(&self, tx: &dyn ReadTx, value: &[u8]) -> Result<IdSet> {
        let mut set = IdSet::new();
        let Some(bucket) = tx.bucket(&self.bucket) else {
            return Ok(set);
        };
        if let Some(raw) = bucket.get(value) {
            for id in decode_id_list(&raw)? {
                set.add(IdEntry::new(id, self.hash, value.to_vec()));
            }
        }
        Ok(set)
    }

    /// Walks the bucket in `scan`'s direction, accumulating ids until
    /// the bound is crossed, the cursor is exhausted, or the id cap is
    /// reached (in which case the result is marked truncated).
    pub(crate) fn lookup_range(&self, tx: &dyn ReadTx, scan: RangeScan<'_>) -> Result<IdSet> {
        let mut set = IdSet::new();
        let Some(bucket) = tx.bucket(&self.bucket) else {
            return Ok(set);
        };
        let mut cursor = bucket.cursor();

        let mut entry = match (scan.ascending, scan.from) {
            (true, None) => cursor.first(),
            (false, None) => cursor.last(),
            (true, Some(from)) => match cursor.seek(from) {
                Some((ref key, _)) if key.as_slice() == from && !scan.inclusive => cursor.next(),
                other => other,
            },
            (false, Some(from)) => match cursor.seek(from) {
                // Landed exactly on the start key.
                Some((key, value)) if key.as_slice() == from => {
                    if scan.inclusive {
                        Some((key, value))
                    } else {
                        cursor.prev()
                    }
                }
                // Overshot (or ran off the end): step back to the
                // immediate predecessor of `from`.
                _ => cursor.prev(),
            },
        };

        while let Some((key, raw)) = entry {
            scan.check_interrupts()?;

            if let Some(to) = scan.to {
                let crossed = match (scan.ascending, scan.inclusive) {
                    (true, true) => key.as_slice() > to,
                    (true, false) => key.as_slice() >= to,
                    (false, true) => key.as_slice() < to,
                    (false, false) => key.as_slice() <= to,
                };
                if crossed {
                    break;
                }
            }

            for id in decode_id_list(&raw)? {
                if set.len() >= scan.limit {
                    set.mark_truncated();
                    tracing::debug!(
                        index = %self.name,
                        limit = scan.limit,
                        "range scan truncated at internal query limit"
                    );
                    return Ok(set);
                }
                set.add(IdEntry::new(id, self.hash, key.clone()));
            }

            entry = if scan.ascending {
                cursor.next()
            } else {
                cursor.prev()
            };
        }

        Ok(set)
    }
}

/// Encodes a sorted id list as a length-prefixed sequence.
pub(crate) fn encode_id_list(ids: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    for id in ids {
        let bytes = id.as_bytes();
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    buf
}

/// Decodes a length-prefixed id list.
pub(crate) fn decode_id_list(raw: &[u8]) -> Result<Vec<String>> {
    let mut pos = 0usize;
    let count = read_u32(raw, &mut pos)?;
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_u32(raw, &mut pos)? as usize;
        let end = pos + len;
        let bytes = raw
            .get(pos..end)
            .ok_or_else(|| Error::corruption("id list truncated"))?;
        pos = end;
        let id = String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::corruption("id list entry is not UTF-8"))?;
        ids.push(id);
    }
    Ok(ids)
}

fn read_u32(raw: &[u8], pos: &mut usize) -> Result<u32> {
    let end = *pos + 4;
    let slice = raw
        .get(*pos..end)
        .ok_or_else(|| Error::corruption("id list truncated"))?;
    *pos = end;
    Ok(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestdb_kv::{Engine, MemoryEngine};
    use serde_json::json;

    fn email_index() -> Index {
        Index::new(
            "users",
            IndexDefinition {
                name: "email".into(),
                kind: ValueKind::Text,
                selector: Selector::new(["Email"]).unwrap(),
            },
        )
    }

    fn seed(engine: &MemoryEngine, index: &Index, pairs: &[(&str, &str)]) {
        let mut tx = engine.begin_write().unwrap();
        for (value, id) in pairs {
            index.insert(&mut *tx, value.as_bytes(), id).unwrap();
        }
        tx.commit().unwrap();
    }

    #[test]
    fn apply_extracts_matching_values() {
        let index = email_index();

        let doc = json!({"Email": "a@b.com", "Age": 4});
        assert_eq!(index.apply(&doc), Some(b"a@b.com".to_vec()));

        // Wrong runtime type: does not participate, no error.
        let doc = json!({"Email": 42});
        assert_eq!(index.apply(&doc), None);

        // Missing field.
        let doc = json!({"Age": 4});
        assert_eq!(index.apply(&doc), None);
    }

    #[test]
    fn insert_is_idempotent() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("a@b.com", "1"), ("a@b.com", "1")]);

        let tx = engine.begin_read().unwrap();
        let set = index.lookup_equal(&*tx, b"a@b.com").unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn lookup_equal_annotates_value() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("a@b.com", "2"), ("a@b.com", "1")]);

        let tx = engine.begin_read().unwrap();
        let set = index.lookup_equal(&*tx, b"a@b.com").unwrap();
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(
            set.entries()[0].values.get(&index.selector_hash()),
            Some(&b"a@b.com".to_vec())
        );

        let empty = index.lookup_equal(&*tx, b"missing").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn remove_deletes_empty_keys() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("a@b.com", "1"), ("a@b.com", "2")]);

        let mut tx = engine.begin_write().unwrap();
        index.remove(&mut *tx, b"a@b.com", "1").unwrap();
        index.remove(&mut *tx, b"a@b.com", "2").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        let bucket = tx.bucket(index.bucket_name()).unwrap();
        assert_eq!(bucket.get(b"a@b.com"), None);
    }

    #[test]
    fn range_greater_skips_start_unless_inclusive() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("b", "1"), ("d", "2"), ("f", "3")]);

        let tx = engine.begin_read().unwrap();

        let exclusive = index
            .lookup_range(
                &*tx,
                RangeScan {
                    from: Some(b"d"),
                    inclusive: false,
                    ..RangeScan::full(100)
                },
            )
            .unwrap();
        assert_eq!(exclusive.ids().collect::<Vec<_>>(), vec!["3"]);

        let inclusive = index
            .lookup_range(
                &*tx,
                RangeScan {
                    from: Some(b"d"),
                    ..RangeScan::full(100)
                },
            )
            .unwrap();
        assert_eq!(inclusive.ids().collect::<Vec<_>>(), vec!["2", "3"]);
    }

    #[test]
    fn range_from_missing_key_starts_at_next() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("b", "1"), ("d", "2")]);

        let tx = engine.begin_read().unwrap();
        let set = index
            .lookup_range(
                &*tx,
                RangeScan {
                    from: Some(b"c"),
                    inclusive: false,
                    ..RangeScan::full(100)
                },
            )
            .unwrap();
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["2"]);
    }

    #[test]
    fn descending_from_missing_key_starts_at_predecessor() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("b", "1"), ("d", "2"), ("f", "3")]);

        let tx = engine.begin_read().unwrap();
        let set = index
            .lookup_range(
                &*tx,
                RangeScan {
                    from: Some(b"e"),
                    ascending: false,
                    ..RangeScan::full(100)
                },
            )
            .unwrap();
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn between_respects_inclusive_flag() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("b", "1"), ("d", "2"), ("f", "3")]);

        let tx = engine.begin_read().unwrap();

        let closed = index
            .lookup_range(
                &*tx,
                RangeScan {
                    from: Some(b"b"),
                    to: Some(b"f"),
                    ..RangeScan::full(100)
                },
            )
            .unwrap();
        assert_eq!(closed.len(), 3);

        let open = index
            .lookup_range(
                &*tx,
                RangeScan {
                    from: Some(b"b"),
                    to: Some(b"f"),
                    inclusive: false,
                    ..RangeScan::full(100)
                },
            )
            .unwrap();
        assert_eq!(open.ids().collect::<Vec<_>>(), vec!["2"]);
    }

    #[test]
    fn range_truncates_at_limit() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("a", "1"), ("b", "2"), ("c", "3")]);

        let tx = engine.begin_read().unwrap();
        let set = index
            .lookup_range(&*tx, RangeScan::full(2))
            .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.truncated());
    }

    #[test]
    fn empty_bucket_yields_empty_set() {
        let engine = MemoryEngine::new();
        let index = email_index();

        let tx = engine.begin_read().unwrap();
        let set = index.lookup_range(&*tx, RangeScan::full(10)).unwrap();
        assert!(set.is_empty());
        assert!(!set.truncated());
    }

    #[test]
    fn expired_deadline_fails_scan() {
        let engine = MemoryEngine::new();
        let index = email_index();
        seed(&engine, &index, &[("a", "1")]);

        let tx = engine.begin_read().unwrap();
        let result = index.lookup_range(
            &*tx,
            RangeScan {
                deadline: Some(Instant::now() - std::time::Duration::from_nanos(1)),
                ..RangeScan::full(10)
            },
        );
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn id_list_round_trip() {
        let ids = vec!["1".to_string(), "216".to_string(), "9".to_string()];
        let decoded = decode_id_list(&encode_id_list(&ids)).unwrap();
        assert_eq!(decoded, ids);

        assert!(decode_id_list(&[1, 0, 0, 0, 10]).is_err());
    }
}
