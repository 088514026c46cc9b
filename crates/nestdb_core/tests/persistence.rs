//! File-backed databases across close and reopen.

use nestdb_core::{Database, Error, Filter, FilterOperator, Options, Query, Selector};
use nestdb_testkit::{standard_indexes, user_dataset, User};
use tempfile::TempDir;

fn email_query(email: &str) -> Query {
    Query::new().filter(
        Filter::new(FilterOperator::Equal, Selector::new(["Email"]).unwrap()).compare_to(email),
    )
}

#[test]
fn data_indexes_and_revisions_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let dataset = user_dataset(9, 30);
    let updated = user_dataset(10, 30);

    {
        let db = Database::open(dir.path(), Options::default()).unwrap();
        let users = db.collection("users").unwrap();
        standard_indexes(&users).unwrap();
        for user in &dataset {
            users.put(&user.id, user).unwrap();
        }
        for user in &updated {
            users.put(&user.id, user).unwrap();
        }
        db.close();
    }

    let db = Database::open(dir.path(), Options::default()).unwrap();
    let users = db.collection("users").unwrap();

    // Index definitions were reloaded from the manifest.
    assert_eq!(users.index_names().len(), 5);

    // Queries resolve against the journaled index state.
    let target = &updated[7];
    let response = users.query(&email_query(&target.email)).unwrap();
    assert_eq!(response.ids().collect::<Vec<_>>(), vec![target.id.as_str()]);

    // Revision history crossed the reopen too.
    let previous = users.get_revision(&target.id, 1).unwrap();
    let previous: User = serde_json::from_slice(&previous).unwrap();
    assert_eq!(previous.email, dataset[7].email);

    // And rollback reindexes the restored payload.
    users.rollback(&target.id, 1).unwrap();
    let response = users.query(&email_query(&dataset[7].email)).unwrap();
    assert_eq!(response.ids().collect::<Vec<_>>(), vec![target.id.as_str()]);
}

#[test]
fn second_process_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let _db = Database::open(dir.path(), Options::default()).unwrap();

    match Database::open(dir.path(), Options::default()) {
        Err(Error::Engine(nestdb_kv::KvError::Locked)) => {}
        other => panic!("expected Locked, got {other:?}"),
    }
}

#[test]
fn deleted_records_stay_deleted_across_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(dir.path(), Options::default()).unwrap();
        let users = db.collection("users").unwrap();
        standard_indexes(&users).unwrap();
        for user in user_dataset(11, 10) {
            users.put(&user.id, &user).unwrap();
        }
        users.delete("3").unwrap();
        db.close();
    }

    let db = Database::open(dir.path(), Options::default()).unwrap();
    let users = db.collection("users").unwrap();
    assert!(matches!(users.get("3"), Err(Error::NotFound { .. })));
    assert_eq!(users.ids("", 100).unwrap().len(), 9);
}
