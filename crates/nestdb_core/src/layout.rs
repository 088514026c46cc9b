//! Bucket naming scheme.
//!
//! ```text
//! records/<collection>            id → current payload
//! refs/<collection>               id → serialized reference record
//! meta/<collection>               collection-local counters
//! indexes/<collection>/<index>    encoded value → sorted id list
//! revisions/<collection>/<id>     big-endian timestamp → payload
//! manifest                        collection → index definitions
//! ```

/// Name of the global manifest bucket.
pub(crate) const MANIFEST_BUCKET: &str = "manifest";

/// Key of the revision-timestamp counter inside a meta bucket.
pub(crate) const REVISION_SEQ_KEY: &[u8] = b"revision_seq";

pub(crate) fn records_bucket(collection: &str) -> String {
    format!("records/{collection}")
}

pub(crate) fn refs_bucket(collection: &str) -> String {
    format!("refs/{collection}")
}

pub(crate) fn meta_bucket(collection: &str) -> String {
    format!("meta/{collection}")
}

pub(crate) fn index_bucket(collection: &str, index: &str) -> String {
    format!("indexes/{collection}/{index}")
}

pub(crate) fn revisions_bucket(collection: &str, id: &str) -> String {
    format!("revisions/{collection}/{id}")
}

/// Prefix shared by all revision buckets of a collection, used when the
/// collection is deleted.
pub(crate) fn revisions_prefix(collection: &str) -> String {
    format!("revisions/{collection}/")
}
