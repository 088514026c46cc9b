//! Test database fixtures.

use nestdb_core::{Database, Options};
use std::path::PathBuf;
use std::sync::Once;
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber honoring `RUST_LOG`, once per
/// process. Call from tests that need database logs.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates an in-memory test database with default options.
    #[must_use]
    pub fn memory() -> Self {
        Self::memory_with(Options::default())
    }

    /// Creates an in-memory test database with custom options.
    #[must_use]
    pub fn memory_with(options: Options) -> Self {
        Self {
            db: Database::open_in_memory(options),
            _temp_dir: None,
        }
    }

    /// Creates a file-backed test database in a temporary directory.
    pub fn file() -> Self {
        Self::file_with(Options::default())
    }

    /// Creates a file-backed test database with custom options.
    pub fn file_with(options: Options) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db = Database::open(temp_dir.path(), options).expect("failed to open file database");
        Self {
            db,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database directory if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|dir| dir.path().to_path_buf())
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test against a fresh in-memory database.
///
/// ```rust,ignore
/// with_temp_db(|db| {
///     let users = db.collection("users").unwrap();
///     // ...
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}
