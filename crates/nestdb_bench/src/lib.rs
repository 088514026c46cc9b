//! Shared helpers for the NestDB benchmark suites.

#![deny(unsafe_code)]

use nestdb_core::{Collection, Database, Options};
use nestdb_testkit::{standard_indexes, user_dataset};
use std::sync::Arc;

/// Builds an in-memory collection pre-filled with `count` generated
/// users and the standard index set.
pub fn seeded_collection(count: usize) -> (Database, Arc<Collection>) {
    let db = Database::open_in_memory(Options::default());
    let users = db.collection("users").expect("collection");
    standard_indexes(&users).expect("indexes");
    for user in user_dataset(42, count) {
        users.put(&user.id, &user).expect("put");
    }
    (db, users)
}
