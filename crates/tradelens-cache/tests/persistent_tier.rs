//! Integration tests for the two-tier cache store against a file-backed SQLite tier.
//!
//! Run with:
//! ```bash
//! cargo test -p tradelens-cache --test persistent_tier
//! ```

use std::sync::Arc;
use std::time::Duration;

use tradelens_cache::{CacheStore, SqliteStore};
use tradelens_models::cache_schema::CacheCategory;

fn file_store(path: &str) -> CacheStore {
    CacheStore::new(100, Duration::from_secs(60)).with_persistence(SqliteStore::open(path).unwrap())
}

/// An entry written by one store is visible to a fresh store on the same file.
#[tokio::test]
async fn entries_survive_a_new_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let path = path.to_str().unwrap();

    {
        let store = file_store(path);
        store
            .put(
                "req:https://api.test/a".to_string(),
                r#"{"a":1}"#.to_string(),
                CacheCategory::Json,
                None,
            )
            .await;
    }

    let reopened = file_store(path);
    let entry = reopened.get("req:https://api.test/a").await.unwrap();
    assert_eq!(entry.body, r#"{"a":1}"#);
}

/// A broken persistent tier never loses the memory entry.
#[tokio::test]
async fn persistent_write_failure_is_non_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.db");
    let path = path.to_str().unwrap();

    let store = file_store(path);

    // Simulate a storage failure by removing the table behind the store's back.
    let raw = rusqlite::Connection::open(path).unwrap();
    raw.execute_batch("DROP TABLE cache_entries").unwrap();

    store
        .put(
            "req:https://api.test/b".to_string(),
            "payload".to_string(),
            CacheCategory::Text,
            None,
        )
        .await;

    let entry = store.get("req:https://api.test/b").await.unwrap();
    assert_eq!(entry.body, "payload");
}

/// Concurrent writers to the same key race without error; the value stays readable.
#[tokio::test]
async fn concurrent_writers_same_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let store = Arc::new(file_store(path.to_str().unwrap()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .put(
                    "req:https://api.test/same".to_string(),
                    format!(r#"{{"writer":{i}}}"#),
                    CacheCategory::Json,
                    None,
                )
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let entry = store.get("req:https://api.test/same").await.unwrap();
    assert!(entry.body.starts_with(r#"{"writer":"#));
}

#[tokio::test]
async fn clear_expired_prunes_persistent_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expire.db");
    let store = file_store(path.to_str().unwrap());

    store
        .put(
            "req:short".to_string(),
            "x".to_string(),
            CacheCategory::Text,
            Some(Duration::from_millis(20)),
        )
        .await;
    store
        .put(
            "req:long".to_string(),
            "y".to_string(),
            CacheCategory::Text,
            Some(Duration::from_secs(600)),
        )
        .await;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let deleted = store.clear_expired().await.unwrap();
    assert_eq!(deleted, 1);
    assert!(store.get("req:long").await.is_some());
}
