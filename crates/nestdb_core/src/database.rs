//! Database facade.

use crate::collection::{write_manifest, Collection};
use crate::config::Options;
use crate::error::Result;
use crate::layout;
use crate::manifest;
use nestdb_kv::{Engine, FileEngine, MemoryEngine};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The main database handle: owns the engine, global options, and the
/// collection registry.
///
/// ```rust,ignore
/// let db = Database::open(Path::new("my_database"), Options::default())?;
/// let users = db.collection("users")?;
/// users.put("1", &user)?;
/// db.close()?;
/// ```
pub struct Database {
    engine: Arc<dyn Engine>,
    options: Arc<Options>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    closing: Arc<AtomicBool>,
}

impl Database {
    /// Opens (or creates) a file-backed database directory.
    pub fn open(path: &Path, options: Options) -> Result<Self> {
        let engine = FileEngine::open_with(
            path,
            options.sync_on_commit,
            Some(options.transaction_timeout),
        )?;
        Ok(Self::with_engine(Arc::new(engine), options))
    }

    /// Opens an ephemeral in-memory database, mainly for tests.
    #[must_use]
    pub fn open_in_memory(options: Options) -> Self {
        let engine = MemoryEngine::with_lock_timeout(options.transaction_timeout);
        Self::with_engine(Arc::new(engine), options)
    }

    /// Wraps a caller-supplied engine implementing the KV contract.
    #[must_use]
    pub fn with_engine(engine: Arc<dyn Engine>, options: Options) -> Self {
        Self {
            engine,
            options: Arc::new(options),
            collections: RwLock::new(HashMap::new()),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the collection with the given name, creating its
    /// buckets and loading its persisted index configuration on first
    /// use.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        if let Some(collection) = self.collections.read().get(name) {
            return Ok(Arc::clone(collection));
        }

        let mut registry = self.collections.write();
        if let Some(collection) = registry.get(name) {
            return Ok(Arc::clone(collection));
        }

        let records_name = layout::records_bucket(name);
        let refs_name = layout::refs_bucket(name);

        let (defs, needs_setup) = {
            let tx = self.engine.begin_read()?;
            let defs = match tx
                .bucket(layout::MANIFEST_BUCKET)
                .and_then(|bucket| bucket.get(name.as_bytes()))
            {
                Some(raw) => Some(manifest::decode(&raw)?),
                None => None,
            };
            let needs_setup =
                defs.is_none() || tx.bucket(&records_name).is_none() || tx.bucket(&refs_name).is_none();
            (defs, needs_setup)
        };

        if needs_setup {
            let mut tx = self.engine.begin_write()?;
            tx.create_bucket(&records_name)?;
            tx.create_bucket(&refs_name)?;
            tx.create_bucket(&layout::meta_bucket(name))?;
            if defs.is_none() {
                write_manifest(&mut *tx, name, &[])?;
            }
            tx.commit()?;
            tracing::debug!(collection = name, "collection created");
        }

        let collection = Arc::new(Collection::new(
            name,
            Arc::clone(&self.engine),
            Arc::clone(&self.options),
            Arc::clone(&self.closing),
            defs.unwrap_or_default(),
        ));
        registry.insert(name.to_owned(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Names of every collection ever created in this database, in
    /// lexicographic order.
    pub fn collection_names(&self) -> Result<Vec<String>> {
        let tx = self.engine.begin_read()?;
        let Some(bucket) = tx.bucket(layout::MANIFEST_BUCKET) else {
            return Ok(Vec::new());
        };

        let mut names = Vec::with_capacity(bucket.len());
        let mut cursor = bucket.cursor();
        let mut entry = cursor.first();
        while let Some((key, _)) = entry {
            if let Ok(name) = String::from_utf8(key) {
                names.push(name);
            }
            entry = cursor.next();
        }
        Ok(names)
    }

    /// Removes a collection and everything it stores: records,
    /// references, revisions, indexes, and its manifest entry.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let mut registry = self.collections.write();
        let mut tx = self.engine.begin_write()?;

        let defs = match tx
            .bucket(layout::MANIFEST_BUCKET)
            .and_then(|bucket| bucket.get(name.as_bytes()))
        {
            Some(raw) => manifest::decode(&raw)?,
            None => Vec::new(),
        };
        for def in &defs {
            tx.drop_bucket(&layout::index_bucket(name, &def.name))?;
        }

        tx.drop_bucket(&layout::records_bucket(name))?;
        tx.drop_bucket(&layout::refs_bucket(name))?;
        tx.drop_bucket(&layout::meta_bucket(name))?;

        let prefix = layout::revisions_prefix(name);
        for bucket in tx.bucket_names() {
            if bucket.starts_with(&prefix) {
                tx.drop_bucket(&bucket)?;
            }
        }

        if let Some(mut bucket) = tx.bucket_mut(layout::MANIFEST_BUCKET) {
            bucket.delete(name.as_bytes());
        }

        tx.commit()?;
        registry.remove(name);
        tracing::debug!(collection = name, "collection deleted");
        Ok(())
    }

    /// The options this database was opened with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Closes the database. In-flight and future queries on
    /// outstanding collection handles fail with
    /// [`crate::Error::Canceled`]; the engine shuts down once the last
    /// handle drops.
    pub fn close(self) {
        self.closing.store(true, Ordering::Relaxed);
        self.collections.write().clear();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;
    use nestdb_codec::ValueKind;
    use serde_json::json;

    #[test]
    fn collection_handles_are_shared() {
        let db = Database::open_in_memory(Options::default());
        let a = db.collection("users").unwrap();
        let b = db.collection("users").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn collection_names_are_listed() {
        let db = Database::open_in_memory(Options::default());
        db.collection("users").unwrap();
        db.collection("orders").unwrap();

        assert_eq!(
            db.collection_names().unwrap(),
            vec!["orders".to_string(), "users".to_string()]
        );
    }

    #[test]
    fn delete_collection_removes_everything() {
        let db = Database::open_in_memory(Options::default());
        let users = db.collection("users").unwrap();
        users
            .set_index("email", ValueKind::Text, Selector::new(["Email"]).unwrap())
            .unwrap();
        users.put("1", &json!({"Email": "a@b.com"})).unwrap();

        db.delete_collection("users").unwrap();
        assert!(db.collection_names().unwrap().is_empty());

        // A fresh handle starts from scratch.
        let users = db.collection("users").unwrap();
        assert!(users.get("1").is_err());
        assert!(users.index_names().is_empty());
    }

    #[test]
    fn close_cancels_queries() {
        use crate::filter::{Filter, FilterOperator, Query};

        let db = Database::open_in_memory(Options::default());
        let users = db.collection("users").unwrap();
        users
            .set_index("email", ValueKind::Text, Selector::new(["Email"]).unwrap())
            .unwrap();
        db.close();

        let query = Query::new().filter(
            Filter::new(FilterOperator::Equal, Selector::new(["Email"]).unwrap())
                .compare_to("a@b.com"),
        );
        assert!(matches!(users.query(&query), Err(crate::Error::Canceled)));
    }

    #[test]
    fn index_configuration_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();

        {
            let db = Database::open(dir.path(), Options::default()).unwrap();
            let users = db.collection("users").unwrap();
            users
                .set_index("email", ValueKind::Text, Selector::new(["Email"]).unwrap())
                .unwrap();
            users.put("1", &json!({"Email": "a@b.com"})).unwrap();
            db.close();
        }

        let db = Database::open(dir.path(), Options::default()).unwrap();
        let users = db.collection("users").unwrap();
        assert_eq!(users.index_names(), vec!["email".to_string()]);
    }
}
