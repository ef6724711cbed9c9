//! Store Facade
//!
//! The user-visible store: named buckets of string-keyed JSON
//! values over a single block file.
//!
//! ## Responsibilities
//! - Create or open the block DB on the backing file
//! - Maintain the bucket directory (a `DiskMap` in the well-known
//!   `"objects"` object, mapping bucket name → object name)
//! - Open buckets lazily — each bucket is its own object → chunk
//!   pool → `DiskMap` triple under the name `"bucket/<name>"`
//! - Hand out read/write transactions
//!
//! Writes and deletes are coalesced in per-transaction caches and
//! applied at commit, under the store's writer lock.

mod tx;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;

use crate::block::{BlockDb, Object};
use crate::error::Result;
use crate::map::DiskMap;
use crate::Options;

pub use tx::{ReadTx, WriteTx};

/// Well-known object holding the bucket directory
const DIRECTORY_OBJECT: &str = "objects";

/// Object-name prefix for bucket objects
const BUCKET_PREFIX: &str = "bucket/";

/// A single-file store of named buckets
pub struct Store<F> {
    db: BlockDb<F>,

    /// Transaction lock: shared for readers, exclusive for writers
    lock: RwLock<()>,

    /// Bucket name → bucket object name, persisted in the block DB
    directory: DiskMap<Object<F>>,

    /// Buckets opened so far this process
    buckets: Mutex<HashMap<String, Arc<DiskMap<Object<F>>>>>,
}

impl Store<File> {
    /// Open or create a store file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Options::default())
    }

    /// Open or create a store file with explicit options
    pub fn open_with(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        Self::open_stream(file, options)
    }
}

impl<F: Read + Write + Seek> Store<F> {
    /// Open a store over any random-access stream
    ///
    /// An empty stream is initialized as a fresh block file; a
    /// non-empty one is opened and validated. The bucket directory
    /// object is created on first use and never truncated.
    pub fn open_stream(mut stream: F, options: Options) -> Result<Self> {
        let size = stream.seek(SeekFrom::End(0))?;
        let db = if size == 0 {
            BlockDb::create(stream, options)?
        } else {
            BlockDb::open(stream)?
        };

        let directory_obj = if db.contains_object(DIRECTORY_OBJECT) {
            db.open_object(DIRECTORY_OBJECT)?
        } else {
            db.create_object(DIRECTORY_OBJECT)?
        };
        let directory = DiskMap::new(directory_obj)?;

        let fresh = size == 0;
        tracing::debug!(fresh, "opened store");

        Ok(Self {
            db,
            lock: RwLock::new(()),
            directory,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// Begin a read transaction (shared lock)
    pub fn reader(&self) -> ReadTx<'_, F> {
        ReadTx::new(self, self.lock.read())
    }

    /// Begin a write transaction (exclusive lock)
    pub fn writer(&self) -> WriteTx<'_, F> {
        WriteTx::new(self, self.lock.write())
    }

    /// One-shot read of a single key
    pub fn get<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<T> {
        let tx = self.reader();
        let value = tx.get(bucket, key)?;
        tx.commit()?;

        Ok(value)
    }

    /// Names of every bucket in the store
    pub fn buckets(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read();

        let mut names = Vec::new();
        self.directory.for_each(|key, _| {
            names.push(String::from_utf8_lossy(key).into_owned());
            true
        })?;

        Ok(names)
    }

    /// Look up an existing bucket, opening it from the directory if
    /// this process hasn't touched it yet
    fn bucket(&self, name: &str) -> Result<Option<Arc<DiskMap<Object<F>>>>> {
        let mut buckets = self.buckets.lock();
        if let Some(map) = buckets.get(name) {
            return Ok(Some(Arc::clone(map)));
        }

        if self.directory.get(name.as_bytes())?.is_none() {
            return Ok(None);
        }

        let object = self.db.open_object(&bucket_path(name))?;
        let map = Arc::new(DiskMap::new(object)?);
        buckets.insert(name.to_string(), Arc::clone(&map));

        Ok(Some(map))
    }

    /// Open a bucket for writing, creating it on first use
    fn bucket_for_write(&self, name: &str) -> Result<Arc<DiskMap<Object<F>>>> {
        if let Some(map) = self.bucket(name)? {
            return Ok(map);
        }

        let path = bucket_path(name);
        let object = self.db.create_object(&path)?;
        let map = Arc::new(DiskMap::new(object)?);

        self.directory.insert(name.as_bytes(), path.as_bytes())?;
        self.buckets
            .lock()
            .insert(name.to_string(), Arc::clone(&map));
        tracing::debug!(bucket = name, "created bucket");

        Ok(map)
    }
}

/// Object name for a user bucket
fn bucket_path(name: &str) -> String {
    format!("{BUCKET_PREFIX}{name}")
}
