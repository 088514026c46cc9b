//! Collections: named sets of records sharing an index configuration.

use crate::config::Options;
use crate::error::{Error, Result};
use crate::filter::{Query, QueryResponse};
use crate::index::{Index, IndexDefinition};
use crate::layout;
use crate::manifest;
use crate::query;
use crate::refs::ReferenceRecord;
use crate::revisions::RevisionStore;
use crate::selector::Selector;
use nestdb_codec::ValueKind;
use nestdb_kv::{Engine, WriteTx};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A named set of records with its secondary indexes.
///
/// Every mutating operation runs inside a single write transaction on
/// the underlying engine: on failure no partial state persists. Reads
/// and queries use one snapshot transaction for their full duration.
pub struct Collection {
    name: String,
    engine: Arc<dyn Engine>,
    options: Arc<Options>,
    indexes: RwLock<Vec<Index>>,
    revisions: RevisionStore,
    closing: Arc<AtomicBool>,
}

impl Collection {
    pub(crate) fn new(
        name: &str,
        engine: Arc<dyn Engine>,
        options: Arc<Options>,
        closing: Arc<AtomicBool>,
        defs: Vec<IndexDefinition>,
    ) -> Self {
        let indexes = defs.into_iter().map(|def| Index::new(name, def)).collect();
        Self {
            name: name.to_owned(),
            engine,
            options,
            indexes: RwLock::new(indexes),
            revisions: RevisionStore::new(name),
            closing,
        }
    }

    /// The collection's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the currently declared indexes, in declaration order.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.indexes
            .read()
            .iter()
            .map(|index| index.name().to_owned())
            .collect()
    }

    /// Stores a record under `id`, replacing and reindexing any
    /// previous payload and appending a revision.
    pub fn put<T: Serialize>(&self, id: &str, record: &T) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        let payload = serde_json::to_vec(&doc)?;

        let indexes = self.indexes.read();
        let mut tx = self.engine.begin_write()?;
        self.put_in_tx(&mut *tx, &indexes, id, &doc, &payload)?;
        tx.commit()?;
        tracing::debug!(collection = %self.name, id, "put");
        Ok(())
    }

    /// Returns the live payload of `id`.
    pub fn get(&self, id: &str) -> Result<Vec<u8>> {
        let tx = self.engine.begin_read()?;
        tx.bucket(&layout::records_bucket(&self.name))
            .and_then(|bucket| bucket.get(id.as_bytes()))
            .ok_or_else(|| Error::not_found(id))
    }

    /// Returns the payload `revisions_back` revisions before the live
    /// one; `0` is the live payload.
    pub fn get_revision(&self, id: &str, revisions_back: usize) -> Result<Vec<u8>> {
        if revisions_back == 0 {
            return self.get(id);
        }
        let tx = self.engine.begin_read()?;
        let (_, payload) = self.revisions.get(&*tx, id, revisions_back)?;
        Ok(payload)
    }

    /// Returns the live record deserialized as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        Ok(serde_json::from_slice(&self.get(id)?)?)
    }

    /// Removes the record, its references, its index entries and its
    /// whole revision history.
    pub fn delete(&self, id: &str) -> Result<()> {
        let indexes = self.indexes.read();
        let mut tx = self.engine.begin_write()?;

        let records_name = layout::records_bucket(&self.name);
        if tx
            .bucket(&records_name)
            .and_then(|bucket| bucket.get(id.as_bytes()))
            .is_none()
        {
            return Err(Error::not_found(id));
        }

        let refs_name = layout::refs_bucket(&self.name);
        if let Some(raw) = tx
            .bucket(&refs_name)
            .and_then(|bucket| bucket.get(id.as_bytes()))
        {
            let mut refs = ReferenceRecord::decode(id, &raw)?;
            let known: Vec<&str> = indexes.iter().map(Index::name).collect();
            refs.retain_known(&known);
            for entry in &refs.refs {
                if let Some(index) = indexes.iter().find(|i| i.name() == entry.index) {
                    index.remove(&mut *tx, &entry.value, id)?;
                }
            }
            if let Some(mut bucket) = tx.bucket_mut(&refs_name) {
                bucket.delete(id.as_bytes());
            }
        }

        if let Some(mut bucket) = tx.bucket_mut(&records_name) {
            bucket.delete(id.as_bytes());
        }
        self.revisions.delete_all(&mut *tx, id)?;

        tx.commit()?;
        tracing::debug!(collection = %self.name, id, "delete");
        Ok(())
    }

    /// Declares a secondary index and backfills it from every live
    /// record.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateIndex`] when the name is taken.
    pub fn set_index(&self, name: &str, kind: ValueKind, selector: Selector) -> Result<()> {
        let mut indexes = self.indexes.write();
        if indexes.iter().any(|index| index.name() == name) {
            return Err(Error::DuplicateIndex {
                name: name.to_owned(),
            });
        }

        let index = Index::new(
            &self.name,
            IndexDefinition {
                name: name.to_owned(),
                kind,
                selector,
            },
        );

        let mut tx = self.engine.begin_write()?;
        tx.create_bucket(index.bucket_name())?;

        let records: Vec<(String, Vec<u8>)> = {
            let records_name = layout::records_bucket(&self.name);
            let Some(bucket) = tx.bucket(&records_name) else {
                return Err(Error::corruption(format!(
                    "records bucket {records_name} missing"
                )));
            };
            let mut out = Vec::with_capacity(bucket.len());
            let mut cursor = bucket.cursor();
            let mut entry = cursor.first();
            while let Some((key, payload)) = entry {
                let id = String::from_utf8(key)
                    .map_err(|_| Error::corruption("record id is not UTF-8"))?;
                out.push((id, payload));
                entry = cursor.next();
            }
            out
        };

        let refs_name = layout::refs_bucket(&self.name);
        let mut backfilled = 0usize;
        for (id, payload) in records {
            let doc: serde_json::Value = serde_json::from_slice(&payload)
                .map_err(|_| Error::corruption(format!("stored record {id} is not valid JSON")))?;
            let Some(encoded) = index.apply(&doc) else {
                continue;
            };
            index.insert(&mut *tx, &encoded, &id)?;

            let mut refs = match tx
                .bucket(&refs_name)
                .and_then(|bucket| bucket.get(id.as_bytes()))
            {
                Some(raw) => ReferenceRecord::decode(&id, &raw)?,
                None => ReferenceRecord::new(&id),
            };
            refs.set(index.name(), encoded);
            tx.bucket_mut(&refs_name)
                .ok_or_else(|| Error::corruption(format!("refs bucket {refs_name} missing")))?
                .put(id.as_bytes(), &refs.encode());
            backfilled += 1;
        }

        let mut defs: Vec<IndexDefinition> = indexes.iter().map(Index::definition).collect();
        defs.push(index.definition());
        write_manifest(&mut *tx, &self.name, &defs)?;

        tx.commit()?;
        tracing::debug!(
            collection = %self.name,
            index = name,
            backfilled,
            "index created"
        );
        indexes.push(index);
        Ok(())
    }

    /// Drops an index. Reference entries naming it are swept lazily on
    /// their next load.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownIndex`] when no index has this name.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        let pos = indexes
            .iter()
            .position(|index| index.name() == name)
            .ok_or_else(|| Error::UnknownIndex {
                name: name.to_owned(),
            })?;

        let mut tx = self.engine.begin_write()?;
        tx.drop_bucket(indexes[pos].bucket_name())?;

        let defs: Vec<IndexDefinition> = indexes
            .iter()
            .filter(|index| index.name() != name)
            .map(Index::definition)
            .collect();
        write_manifest(&mut *tx, &self.name, &defs)?;

        tx.commit()?;
        tracing::debug!(collection = %self.name, index = name, "index dropped");
        indexes.remove(pos);
        Ok(())
    }

    /// Restores the revision `revisions_back` steps before the live one
    /// as the new live payload, reindexing accordingly. Returns the
    /// timestamp of the restored revision.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::RevisionOutOfRange`] beyond the stored
    /// history, leaving state unchanged.
    pub fn rollback(&self, id: &str, revisions_back: usize) -> Result<u64> {
        let indexes = self.indexes.read();
        let mut tx = self.engine.begin_write()?;

        let stored = self.revisions.count(tx.as_read(), id);
        if stored == 0 {
            return Err(Error::not_found(id));
        }
        if revisions_back >= stored {
            return Err(Error::RevisionOutOfRange {
                requested: revisions_back,
                stored,
            });
        }

        let (timestamp, payload) = self.revisions.get(tx.as_read(), id, revisions_back)?;
        let doc: serde_json::Value = serde_json::from_slice(&payload)
            .map_err(|_| Error::corruption(format!("stored revision of {id} is not valid JSON")))?;
        self.put_in_tx(&mut *tx, &indexes, id, &doc, &payload)?;

        tx.commit()?;
        tracing::debug!(collection = %self.name, id, revisions_back, "rollback");
        Ok(timestamp)
    }

    /// Runs a query against this collection.
    pub fn query(&self, query: &Query) -> Result<QueryResponse> {
        query::execute(self, query)
    }

    /// Lists record ids in id order, starting at `start` (empty string
    /// for the beginning), up to `limit`.
    pub fn ids(&self, start: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .get_values(start, limit)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Lists (id, payload) pairs in id order, starting at `start`, up
    /// to `limit`.
    pub fn get_values(&self, start: &str, limit: usize) -> Result<Vec<(String, Vec<u8>)>> {
        let tx = self.engine.begin_read()?;
        let Some(bucket) = tx.bucket(&layout::records_bucket(&self.name)) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        let mut cursor = bucket.cursor();
        let mut entry = if start.is_empty() {
            cursor.first()
        } else {
            cursor.seek(start.as_bytes())
        };
        while let Some((key, payload)) = entry {
            if out.len() >= limit {
                break;
            }
            let id =
                String::from_utf8(key).map_err(|_| Error::corruption("record id is not UTF-8"))?;
            out.push((id, payload));
            entry = cursor.next();
        }
        Ok(out)
    }

    /// The shared put path: diff references, patch indexes, write the
    /// payload and reference record, append a revision.
    fn put_in_tx(
        &self,
        tx: &mut dyn WriteTx,
        indexes: &[Index],
        id: &str,
        doc: &serde_json::Value,
        payload: &[u8],
    ) -> Result<()> {
        let refs_name = layout::refs_bucket(&self.name);
        let known: Vec<&str> = indexes.iter().map(Index::name).collect();

        let mut old = match tx
            .bucket(&refs_name)
            .and_then(|bucket| bucket.get(id.as_bytes()))
        {
            Some(raw) => ReferenceRecord::decode(id, &raw)?,
            None => ReferenceRecord::new(id),
        };
        old.retain_known(&known);

        let mut new = ReferenceRecord::new(id);
        for index in indexes {
            if let Some(encoded) = index.apply(doc) {
                new.set(index.name(), encoded);
            }
        }

        let (added, removed) = ReferenceRecord::diff(&old, &new);
        for entry in removed {
            if let Some(index) = indexes.iter().find(|i| i.name() == entry.index) {
                index.remove(tx, &entry.value, id)?;
            }
        }
        for entry in added {
            if let Some(index) = indexes.iter().find(|i| i.name() == entry.index) {
                index.insert(tx, &entry.value, id)?;
            }
        }

        tx.bucket_mut(&refs_name)
            .ok_or_else(|| Error::corruption(format!("refs bucket {refs_name} missing")))?
            .put(id.as_bytes(), &new.encode());

        let records_name = layout::records_bucket(&self.name);
        tx.bucket_mut(&records_name)
            .ok_or_else(|| Error::corruption(format!("records bucket {records_name} missing")))?
            .put(id.as_bytes(), payload);

        let timestamp = self.revisions.next_timestamp(tx)?;
        self.revisions
            .append(tx, id, timestamp, payload, self.options.revision_depth)?;
        Ok(())
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub(crate) fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn index_registry(&self) -> &RwLock<Vec<Index>> {
        &self.indexes
    }

    pub(crate) fn closing_flag(&self) -> &AtomicBool {
        &self.closing
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("indexes", &self.index_names())
            .finish_non_exhaustive()
    }
}

pub(crate) fn write_manifest(
    tx: &mut dyn WriteTx,
    collection: &str,
    defs: &[IndexDefinition],
) -> Result<()> {
    tx.create_bucket(layout::MANIFEST_BUCKET)?;
    tx.bucket_mut(layout::MANIFEST_BUCKET)
        .ok_or_else(|| Error::corruption("manifest bucket missing"))?
        .put(collection.as_bytes(), &manifest::encode(defs));
    Ok(())
}
