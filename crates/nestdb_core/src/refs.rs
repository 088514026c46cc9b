//! Reference records.
//!
//! One sidecar per record id lists the (index name, encoded value)
//! pairs currently recorded for that id. On update the diff between the
//! old and new reference records drives the minimal set of index bucket
//! mutations; on delete it names everything that must be removed.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};

/// Format version of the encoded reference record.
const REFS_VERSION: u8 = 1;

/// One (index name, encoded value) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RefEntry {
    pub index: String,
    pub value: Vec<u8>,
}

/// The references a record currently holds across all indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReferenceRecord {
    pub id: String,
    pub hash_id: u64,
    pub refs: Vec<RefEntry>,
}

impl ReferenceRecord {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            hash_id: hash_object_id(id),
            refs: Vec::new(),
        }
    }

    /// Records the indexed value for `index`, replacing any previous
    /// value for the same index.
    pub(crate) fn set(&mut self, index: &str, value: Vec<u8>) {
        for entry in &mut self.refs {
            if entry.index == index {
                entry.value = value;
                return;
            }
        }
        self.refs.push(RefEntry {
            index: index.to_owned(),
            value,
        });
    }

    /// Drops reference entries whose index is not in `known`.
    ///
    /// Index deletion sweeps lazily: a reference naming a dropped index
    /// is ignored the next time the record is loaded.
    pub(crate) fn retain_known(&mut self, known: &[&str]) {
        self.refs.retain(|entry| known.contains(&entry.index.as_str()));
    }

    /// Pairwise symmetric difference between two reference records.
    ///
    /// Returns the entries present only in `new` (to insert) and the
    /// entries present only in `old` (to remove).
    pub(crate) fn diff(old: &Self, new: &Self) -> (Vec<RefEntry>, Vec<RefEntry>) {
        let added = new
            .refs
            .iter()
            .filter(|entry| !old.refs.contains(entry))
            .cloned()
            .collect();
        let removed = old
            .refs
            .iter()
            .filter(|entry| !new.refs.contains(entry))
            .cloned()
            .collect();
        (added, removed)
    }

    /// Encodes into the compact length-prefixed form.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(REFS_VERSION);
        buf.extend_from_slice(&self.hash_id.to_le_bytes());
        buf.extend_from_slice(&(self.refs.len() as u16).to_le_bytes());
        for entry in &self.refs {
            let name = entry.index.as_bytes();
            buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
            buf.extend_from_slice(name);
            buf.extend_from_slice(&(entry.value.len() as u32).to_le_bytes());
            buf.extend_from_slice(&entry.value);
        }
        buf
    }

    /// Decodes a reference record stored under `id`.
    pub(crate) fn decode(id: &str, raw: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let version = *raw
            .get(pos)
            .ok_or_else(|| Error::corruption("reference record is empty"))?;
        pos += 1;
        if version != REFS_VERSION {
            return Err(Error::corruption(format!(
                "unsupported reference record version {version}"
            )));
        }

        let hash_id = u64::from_le_bytes(
            take(raw, &mut pos, 8)?
                .try_into()
                .expect("8-byte slice"),
        );
        let count = u16::from_le_bytes(
            take(raw, &mut pos, 2)?
                .try_into()
                .expect("2-byte slice"),
        );

        let mut refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_len = u16::from_le_bytes(
                take(raw, &mut pos, 2)?
                    .try_into()
                    .expect("2-byte slice"),
            ) as usize;
            let index = String::from_utf8(take(raw, &mut pos, name_len)?.to_vec())
                .map_err(|_| Error::corruption("reference index name is not UTF-8"))?;
            let value_len = u32::from_le_bytes(
                take(raw, &mut pos, 4)?
                    .try_into()
                    .expect("4-byte slice"),
            ) as usize;
            let value = take(raw, &mut pos, value_len)?.to_vec();
            refs.push(RefEntry { index, value });
        }

        Ok(Self {
            id: id.to_owned(),
            hash_id,
            refs,
        })
    }
}

fn take<'a>(raw: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = *pos + len;
    let slice = raw
        .get(*pos..end)
        .ok_or_else(|| Error::corruption("reference record truncated"))?;
    *pos = end;
    Ok(slice)
}

fn hash_object_id(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("8-byte prefix"))
}
