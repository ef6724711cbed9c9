//! Transactions
//!
//! Read transactions hold the store's shared lock and read straight
//! from disk. Write transactions hold the exclusive lock and buffer
//! every `set`/`delete` in per-bucket caches; `commit` applies
//! writes first, then deletes, with deletes shadowing pending writes
//! to the same key. Dropping a transaction without committing
//! discards the caches and releases the lock.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, VaultError};

use super::Store;

/// A read-only view of the store
pub struct ReadTx<'a, F> {
    store: &'a Store<F>,
    _guard: RwLockReadGuard<'a, ()>,
}

impl<'a, F: Read + Write + Seek> ReadTx<'a, F> {
    pub(super) fn new(store: &'a Store<F>, guard: RwLockReadGuard<'a, ()>) -> Self {
        Self {
            store,
            _guard: guard,
        }
    }

    /// Read and deserialize one value
    pub fn get<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<T> {
        let map = self
            .store
            .bucket(bucket)?
            .ok_or_else(|| VaultError::BucketNotFound(bucket.to_string()))?;
        let bytes = map.get(key.as_bytes())?.ok_or(VaultError::KeyNotFound)?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every key in a bucket, in unspecified order
    pub fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let map = self
            .store
            .bucket(bucket)?
            .ok_or_else(|| VaultError::BucketNotFound(bucket.to_string()))?;

        let mut keys = Vec::new();
        map.for_each(|key, _| {
            keys.push(String::from_utf8_lossy(key).into_owned());
            true
        })?;

        Ok(keys)
    }

    /// Finish the transaction, releasing the shared lock
    pub fn commit(self) -> Result<()> {
        Ok(())
    }

    /// Abandon the transaction; equivalent to dropping it
    pub fn rollback(self) {}
}

/// A buffered read/write view of the store
///
/// Nothing touches disk until `commit`.
pub struct WriteTx<'a, F> {
    store: &'a Store<F>,
    _guard: RwLockWriteGuard<'a, ()>,

    /// bucket → key → serialized JSON payload
    writes: HashMap<String, HashMap<String, Vec<u8>>>,
    /// bucket → key → deleted flag (`false` = delete rescinded)
    deletes: HashMap<String, HashMap<String, bool>>,
}

impl<'a, F: Read + Write + Seek> WriteTx<'a, F> {
    pub(super) fn new(store: &'a Store<F>, guard: RwLockWriteGuard<'a, ()>) -> Self {
        Self {
            store,
            _guard: guard,
            writes: HashMap::new(),
            deletes: HashMap::new(),
        }
    }

    /// Buffer a write; visible to this transaction's reads
    pub fn set<T: Serialize>(&mut self, bucket: &str, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;

        self.writes
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), payload);

        // A later set rescinds an earlier delete of the same key.
        if let Some(deleted) = self.deletes.get_mut(bucket) {
            deleted.insert(key.to_string(), false);
        }

        Ok(())
    }

    /// Buffer a delete; shadows pending writes to the same key
    pub fn delete(&mut self, bucket: &str, key: &str) {
        self.deletes
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), true);
    }

    /// Read one value, consulting the caches first
    pub fn get<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<T> {
        if self.is_deleted(bucket, key) {
            return Err(VaultError::KeyNotFound);
        }
        if let Some(cached) = self.writes.get(bucket).and_then(|b| b.get(key)) {
            return Ok(serde_json::from_slice(cached)?);
        }

        let map = self
            .store
            .bucket(bucket)?
            .ok_or_else(|| VaultError::BucketNotFound(bucket.to_string()))?;
        let bytes = map.get(key.as_bytes())?.ok_or(VaultError::KeyNotFound)?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every key in a bucket, with cached writes layered on top of
    /// the on-disk scan and cached deletes filtered out
    pub fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let map = self
            .store
            .bucket(bucket)?
            .ok_or_else(|| VaultError::BucketNotFound(bucket.to_string()))?;

        let mut keys = Vec::new();
        map.for_each(|key, _| {
            let key = String::from_utf8_lossy(key).into_owned();
            if !self.is_deleted(bucket, &key) {
                keys.push(key);
            }
            true
        })?;

        if let Some(cached) = self.writes.get(bucket) {
            for key in cached.keys() {
                if self.is_deleted(bucket, key) || keys.contains(key) {
                    continue;
                }
                keys.push(key.clone());
            }
        }

        Ok(keys)
    }

    /// Apply the caches to disk: writes first, then deletes
    ///
    /// A delete of a key with a pending write suppresses the write.
    /// Deletes against buckets that don't exist are skipped; a
    /// delete of a key that was never stored fails with
    /// `KeyNotFound`. A failure mid-commit leaves already-applied
    /// entries in place.
    pub fn commit(self) -> Result<()> {
        for (bucket, entries) in &self.writes {
            let live = entries.keys().any(|key| !self.is_deleted(bucket, key));
            if !live {
                continue;
            }

            let map = self.store.bucket_for_write(bucket)?;
            for (key, payload) in entries {
                if self.is_deleted(bucket, key) {
                    continue;
                }
                map.insert(key.as_bytes(), payload)?;
            }
        }

        for (bucket, entries) in &self.deletes {
            let Some(map) = self.store.bucket(bucket)? else {
                continue;
            };
            for (key, &deleted) in entries {
                if !deleted {
                    continue;
                }
                map.remove(key.as_bytes())?;
            }
        }

        tracing::debug!(
            write_buckets = self.writes.len(),
            delete_buckets = self.deletes.len(),
            "committed transaction"
        );

        Ok(())
    }

    /// Abandon the transaction, discarding the caches
    pub fn rollback(self) {}

    fn is_deleted(&self, bucket: &str, key: &str) -> bool {
        self.deletes
            .get(bucket)
            .and_then(|d| d.get(key))
            .copied()
            .unwrap_or(false)
    }
}
