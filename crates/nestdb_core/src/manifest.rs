//! Per-collection manifest of index definitions.
//!
//! The manifest bucket maps each collection name to the encoded list of
//! its index definitions. It is read when a collection handle is
//! created and rewritten inside the same transaction as every
//! `set_index`/`delete_index`, so the persisted configuration can never
//! drift from the buckets.

use crate::error::{Error, Result};
use crate::index::IndexDefinition;
use crate::selector::Selector;
use nestdb_codec::ValueKind;

/// Magic bytes identifying a manifest entry.
const MANIFEST_MAGIC: [u8; 4] = *b"NMFN";

/// Current manifest format version.
const MANIFEST_VERSION: u16 = 1;

/// Encodes a collection's index definitions (deterministic).
pub(crate) fn encode(defs: &[IndexDefinition]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MANIFEST_MAGIC);
    buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
    buf.extend_from_slice(&(defs.len() as u16).to_le_bytes());

    for def in defs {
        let name = def.name.as_bytes();
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name);
        buf.push(def.kind.as_byte());

        let fields = def.selector.fields();
        buf.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        for field in fields {
            let bytes = field.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
    }
    buf
}

/// Decodes a collection's index definitions.
pub(crate) fn decode(raw: &[u8]) -> Result<Vec<IndexDefinition>> {
    let mut pos = 0usize;

    let magic = take(raw, &mut pos, 4)?;
    if magic != MANIFEST_MAGIC {
        return Err(Error::corruption("bad manifest magic"));
    }
    let version = u16::from_le_bytes(take(raw, &mut pos, 2)?.try_into().expect("2-byte slice"));
    if version != MANIFEST_VERSION {
        return Err(Error::corruption(format!(
            "unsupported manifest version {version}"
        )));
    }

    let count = u16::from_le_bytes(take(raw, &mut pos, 2)?.try_into().expect("2-byte slice"));
    let mut defs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_string(raw, &mut pos)?;
        let kind_tag = take(raw, &mut pos, 1)?[0];
        let kind = ValueKind::from_byte(kind_tag)
            .map_err(|_| Error::corruption(format!("unknown index kind tag {kind_tag}")))?;

        let field_count = u16::from_le_bytes(take(raw, &mut pos, 2)?.try_into().expect("2-byte slice"));
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(read_string(raw, &mut pos)?);
        }
        let selector = Selector::new(fields)
            .map_err(|_| Error::corruption("manifest selector is empty"))?;

        defs.push(IndexDefinition {
            name,
            kind,
            selector,
        });
    }
    Ok(defs)
}

fn read_string(raw: &[u8], pos: &mut usize) -> Result<String> {
    let len = u16::from_le_bytes(take(raw, pos, 2)?.try_into().expect("2-byte slice")) as usize;
    String::from_utf8(take(raw, pos, len)?.to_vec())
        .map_err(|_| Error::corruption("manifest string is not UTF-8"))
}

fn take<'a>(raw: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = *pos + len;
    let slice = raw
        .get(*pos..end)
        .ok_or_else(|| Error::corruption("manifest truncated"))?;
    *pos = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> Vec<IndexDefinition> {
        vec![
            IndexDefinition {
                name: "email".into(),
                kind: ValueKind::Text,
                selector: Selector::new(["Email"]).unwrap(),
            },
            IndexDefinition {
                name: "zip".into(),
                kind: ValueKind::Uint,
                selector: Selector::new(["Address", "ZipCode"]).unwrap(),
            },
        ]
    }

    #[test]
    fn round_trip() {
        let original = defs();
        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn empty_list_round_trips() {
        assert_eq!(decode(&encode(&[])).unwrap(), Vec::new());
    }

    #[test]
    fn garbage_is_corruption() {
        assert!(matches!(decode(b"XXXX"), Err(Error::Corruption { .. })));

        let mut raw = encode(&defs());
        raw.truncate(raw.len() - 3);
        assert!(matches!(decode(&raw), Err(Error::Corruption { .. })));
    }
}
