//! Tests for the on-disk hash map
//!
//! These tests verify:
//! - Store/load/overwrite/delete semantics
//! - Trie splits once a slot's list passes the length threshold
//! - Iteration over every stored pair
//! - Reopening a map from its backing stream

use std::collections::HashMap;
use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use vaultkv::{DiskMap, VaultError};

// =============================================================================
// Helper Functions
// =============================================================================

/// The slot function for the root array (its chunk sits at position
/// 0, so the salt is "0"): fnv1a_32(salt ++ key) % 128.
fn root_slot(key: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in b"0".iter().chain(key) {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }

    hash % 128
}

/// Keys that all hash into the same root slot
fn colliding_keys(count: usize) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    let mut i = 0u64;
    while keys.len() < count {
        let key = format!("key{i}").into_bytes();
        if root_slot(&key) == 0 {
            keys.push(key);
        }
        i += 1;
    }

    keys
}

// =============================================================================
// Basic Semantics
// =============================================================================

#[test]
fn test_store_then_load() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    map.insert(b"foo", b"bar").unwrap();
    assert_eq!(map.get(b"foo").unwrap(), Some(b"bar".to_vec()));
    assert_eq!(map.get(b"missing").unwrap(), None);
}

#[test]
fn test_overwrite_replaces_value() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    map.insert(b"k", b"v1").unwrap();
    map.insert(b"k", b"v2").unwrap();
    assert_eq!(map.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_empty_value() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    map.insert(b"k", b"").unwrap();
    assert_eq!(map.get(b"k").unwrap(), Some(Vec::new()));
}

#[test]
fn test_remove() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    map.insert(b"k", b"v").unwrap();
    map.remove(b"k").unwrap();
    assert_eq!(map.get(b"k").unwrap(), None);

    let err = map.remove(b"k").unwrap_err();
    assert!(matches!(err, VaultError::KeyNotFound));
}

#[test]
fn test_remove_releases_chunks() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    map.insert(b"key", b"value").unwrap();
    let chunks = map.stats().unwrap().chunks;

    // Removing frees the node, key, and value chunks; a same-shaped
    // insert reuses all three instead of appending.
    map.remove(b"key").unwrap();
    map.insert(b"yek", b"eulav").unwrap();
    assert_eq!(map.stats().unwrap().chunks, chunks);
}

#[test]
fn test_for_each_visits_all_pairs() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    for i in 0..100u32 {
        map.insert(format!("key{i}").as_bytes(), &i.to_le_bytes())
            .unwrap();
    }

    let mut seen = HashMap::new();
    map.for_each(|key, value| {
        seen.insert(key.to_vec(), value.to_vec());
        true
    })
    .unwrap();

    assert_eq!(seen.len(), 100);
    for i in 0..100u32 {
        assert_eq!(
            seen.get(format!("key{i}").as_bytes()),
            Some(&i.to_le_bytes().to_vec())
        );
    }
}

#[test]
fn test_for_each_stops_early() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    for i in 0..10u32 {
        map.insert(format!("key{i}").as_bytes(), b"v").unwrap();
    }

    let mut visited = 0;
    map.for_each(|_, _| {
        visited += 1;
        visited < 3
    })
    .unwrap();
    assert_eq!(visited, 3);
}

// =============================================================================
// Splits
// =============================================================================

#[test]
fn test_full_list_splits_into_child_array() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    // 33 keys in the same root slot force the 32-entry list to
    // convert into a child bucket array.
    let keys = colliding_keys(33);
    for (i, key) in keys.iter().enumerate() {
        map.insert(key, format!("value{i}").as_bytes()).unwrap();
    }

    assert!(map.stats().unwrap().max_depth >= 2);
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(
            map.get(key).unwrap(),
            Some(format!("value{i}").into_bytes()),
        );
    }
}

#[test]
fn test_split_survives_reopen() {
    let mut buf = Cursor::new(Vec::new());

    let keys = colliding_keys(40);
    {
        let map = DiskMap::new(&mut buf).unwrap();
        for key in &keys {
            map.insert(key, b"v").unwrap();
        }
    }

    let map = DiskMap::new(&mut buf).unwrap();
    assert!(map.stats().unwrap().max_depth >= 2);
    for key in &keys {
        assert_eq!(map.get(key).unwrap(), Some(b"v".to_vec()));
    }
}

#[test]
fn test_overwrite_after_split() {
    let mut buf = Cursor::new(Vec::new());
    let map = DiskMap::new(&mut buf).unwrap();

    let keys = colliding_keys(36);
    for key in &keys {
        map.insert(key, b"old").unwrap();
    }
    for key in &keys {
        map.insert(key, b"new").unwrap();
    }

    let mut count = 0;
    map.for_each(|_, value| {
        assert_eq!(value, b"new");
        count += 1;
        true
    })
    .unwrap();
    assert_eq!(count, keys.len());
}

// =============================================================================
// Random Workload
// =============================================================================

#[test]
fn test_random_pairs_round_trip() {
    const N: usize = 10_000;

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut expected: HashMap<Vec<u8>, Vec<u8>> = HashMap::with_capacity(N);
    while expected.len() < N {
        let mut key = vec![0u8; rng.gen_range(3..=256)];
        rng.fill_bytes(&mut key);
        let mut value = vec![0u8; rng.gen_range(0..=16_384)];
        rng.fill_bytes(&mut value);
        expected.insert(key, value);
    }

    let mut buf = Cursor::new(Vec::new());
    {
        let map = DiskMap::new(&mut buf).unwrap();

        for (key, value) in &expected {
            map.insert(key, value).unwrap();
            assert_eq!(map.get(key).unwrap().as_ref(), Some(value));
        }

        for (key, value) in &expected {
            assert_eq!(map.get(key).unwrap().as_ref(), Some(value));
        }

        // Overwrite every value.
        for value in expected.values_mut() {
            rng.fill_bytes(value);
        }
        for (key, value) in &expected {
            map.insert(key, value).unwrap();
        }
        for (key, value) in &expected {
            assert_eq!(map.get(key).unwrap().as_ref(), Some(value));
        }

        let mut count = 0usize;
        map.for_each(|key, value| {
            assert_eq!(expected.get(key).map(|v| v.as_slice()), Some(value));
            count += 1;
            true
        })
        .unwrap();
        assert_eq!(count, N);
    }

    // Reopen from the same backing stream.
    let map = DiskMap::new(&mut buf).unwrap();
    for (key, value) in &expected {
        assert_eq!(map.get(key).unwrap().as_ref(), Some(value));
    }
}
