//! Integration tests for the store facade
//!
//! These tests span the whole stack: transactions, bucket
//! directory persistence across reopen, cache visibility inside a
//! write transaction, and concurrent readers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use vaultkv::{Store, VaultError};

// =============================================================================
// Helper Functions
// =============================================================================

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("store.vkv")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    age: u32,
}

// =============================================================================
// Commit and Reopen
// =============================================================================

#[test]
fn test_set_commit_reopen_get() {
    let dir = TempDir::new().unwrap();

    {
        let store = Store::open(store_path(&dir)).unwrap();
        let mut tx = store.writer();
        tx.set("foo", "k", &1i64).unwrap();
        tx.commit().unwrap();
    }

    {
        let store = Store::open(store_path(&dir)).unwrap();
        assert_eq!(store.get::<i64>("foo", "k").unwrap(), 1);

        let mut tx = store.writer();
        tx.delete("foo", "k");
        tx.commit().unwrap();
    }

    let store = Store::open(store_path(&dir)).unwrap();
    let err = store.get::<i64>("foo", "k").unwrap_err();
    assert!(matches!(err, VaultError::KeyNotFound));
}

#[test]
fn test_struct_values_round_trip() {
    let dir = TempDir::new().unwrap();
    let alice = User {
        name: "Alice".to_string(),
        age: 30,
    };

    {
        let store = Store::open(store_path(&dir)).unwrap();
        let mut tx = store.writer();
        tx.set("users", "alice", &alice).unwrap();
        tx.set("users", "greeting", &"hello").unwrap();
        tx.commit().unwrap();
    }

    let store = Store::open(store_path(&dir)).unwrap();
    assert_eq!(store.get::<User>("users", "alice").unwrap(), alice);
    assert_eq!(store.get::<String>("users", "greeting").unwrap(), "hello");
}

#[test]
fn test_buckets_survive_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let store = Store::open(store_path(&dir)).unwrap();
        let mut tx = store.writer();
        tx.set("alpha", "k", &1).unwrap();
        tx.set("beta", "k", &2).unwrap();
        tx.commit().unwrap();

        let mut buckets = store.buckets().unwrap();
        buckets.sort();
        assert_eq!(buckets, vec!["alpha", "beta"]);
    }

    let store = Store::open(store_path(&dir)).unwrap();
    let mut buckets = store.buckets().unwrap();
    buckets.sort();
    assert_eq!(buckets, vec!["alpha", "beta"]);
    assert_eq!(store.get::<i32>("beta", "k").unwrap(), 2);
}

#[test]
fn test_many_keys_survive_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let store = Store::open(store_path(&dir)).unwrap();
        let mut tx = store.writer();
        for i in 0..500u32 {
            tx.set("numbers", &format!("key{i}"), &i).unwrap();
        }
        tx.commit().unwrap();
    }

    let store = Store::open(store_path(&dir)).unwrap();
    for i in 0..500u32 {
        assert_eq!(store.get::<u32>("numbers", &format!("key{i}")).unwrap(), i);
    }

    let tx = store.reader();
    let keys = tx.list("numbers").unwrap();
    tx.commit().unwrap();
    assert_eq!(keys.len(), 500);
}

// =============================================================================
// Transaction Cache Visibility
// =============================================================================

#[test]
fn test_uncommitted_writes_visible_to_tx() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let mut tx = store.writer();
    tx.set("foo", "k", &42).unwrap();
    assert_eq!(tx.get::<i32>("foo", "k").unwrap(), 42);
    tx.rollback();

    // Nothing was committed, so the bucket was never created.
    let err = store.get::<i32>("foo", "k").unwrap_err();
    assert!(matches!(err, VaultError::BucketNotFound(_)));
}

#[test]
fn test_delete_shadows_pending_write() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let mut tx = store.writer();
    tx.set("foo", "k", &1).unwrap();
    tx.delete("foo", "k");

    let err = tx.get::<i32>("foo", "k").unwrap_err();
    assert!(matches!(err, VaultError::KeyNotFound));

    // All writes were shadowed, so commit creates nothing.
    tx.commit().unwrap();
    let err = store.get::<i32>("foo", "k").unwrap_err();
    assert!(matches!(err, VaultError::BucketNotFound(_)));
}

#[test]
fn test_set_after_delete_rescinds_it() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let mut tx = store.writer();
    tx.set("foo", "k", &1).unwrap();
    tx.commit().unwrap();

    let mut tx = store.writer();
    tx.delete("foo", "k");
    tx.set("foo", "k", &2).unwrap();
    tx.commit().unwrap();

    assert_eq!(store.get::<i32>("foo", "k").unwrap(), 2);
}

#[test]
fn test_list_layers_caches_over_disk() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let mut tx = store.writer();
    tx.set("foo", "a", &1).unwrap();
    tx.set("foo", "b", &2).unwrap();
    tx.commit().unwrap();

    let mut tx = store.writer();
    tx.set("foo", "c", &3).unwrap();
    tx.delete("foo", "a");

    let mut keys = tx.list("foo").unwrap();
    keys.sort();
    assert_eq!(keys, vec!["b", "c"]);
    tx.rollback();

    // After rollback the base contents are untouched.
    let tx = store.reader();
    let mut keys = tx.list("foo").unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a", "b"]);
}

#[test]
fn test_rollback_discards_changes() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let mut tx = store.writer();
    tx.set("foo", "k", &1).unwrap();
    tx.commit().unwrap();

    let mut tx = store.writer();
    tx.set("foo", "k", &2).unwrap();
    tx.rollback();

    assert_eq!(store.get::<i32>("foo", "k").unwrap(), 1);
}

#[test]
fn test_dropped_tx_behaves_like_rollback() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    {
        let mut tx = store.writer();
        tx.set("foo", "k", &1).unwrap();
        // Dropped without commit.
    }

    let err = store.get::<i32>("foo", "k").unwrap_err();
    assert!(matches!(err, VaultError::BucketNotFound(_)));
}

#[test]
fn test_delete_of_missing_key_fails_commit() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let mut tx = store.writer();
    tx.set("foo", "k", &1).unwrap();
    tx.commit().unwrap();

    let mut tx = store.writer();
    tx.delete("foo", "never-stored");
    let err = tx.commit().unwrap_err();
    assert!(matches!(err, VaultError::KeyNotFound));
}

#[test]
fn test_missing_bucket_reads() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let err = store.get::<i32>("nope", "k").unwrap_err();
    assert!(matches!(err, VaultError::BucketNotFound(_)));

    let tx = store.reader();
    let err = tx.list("nope").unwrap_err();
    assert!(matches!(err, VaultError::BucketNotFound(_)));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_readers() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(store_path(&dir)).unwrap();

    let mut tx = store.writer();
    for i in 0..100u32 {
        tx.set("shared", &format!("key{i}"), &i).unwrap();
    }
    tx.commit().unwrap();

    let store = Arc::new(store);
    let mut handles = Vec::new();
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            for i in (t..100u32).step_by(4) {
                let got = store.get::<u32>("shared", &format!("key{i}")).unwrap();
                assert_eq!(got, i);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
