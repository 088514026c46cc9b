//! # NestDB Core
//!
//! An embedded, single-process document store. JSON-serializable records
//! live in named collections, addressed by caller-supplied string ids.
//! Collections maintain user-declared secondary indexes over nested
//! field paths, and answer queries that combine per-index filters with
//! ordering and paging. Every put keeps the previous payload as a
//! revision, so records can be rolled back a bounded number of steps.
//!
//! ```rust,ignore
//! use nestdb_core::{Database, Filter, FilterOperator, Options, Query, Selector, ValueKind};
//!
//! let db = Database::open_in_memory(Options::default())?;
//! let users = db.collection("users")?;
//!
//! users.set_index("email", ValueKind::Text, Selector::new(["Email"])?)?;
//! users.put("1", &user)?;
//!
//! let response = users.query(
//!     &Query::new().filter(
//!         Filter::new(FilterOperator::Equal, Selector::new(["Email"])?)
//!             .compare_to("gödel-76@rudolph.com"),
//!     ),
//! )?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod error;
mod extract;
mod filter;
mod idset;
mod index;
mod layout;
mod manifest;
mod query;
mod refs;
mod revisions;
mod selector;

pub use collection::Collection;
pub use config::Options;
pub use database::Database;
pub use error::{Error, Result};
pub use filter::{Filter, FilterOperator, Query, QueryResponse};
pub use idset::{IdEntry, IdSet};
pub use index::IndexDefinition;
pub use selector::{Selector, SelectorHash};

pub use nestdb_codec::{Value, ValueKind};
pub use nestdb_kv::{Engine, FileEngine, MemoryEngine};
