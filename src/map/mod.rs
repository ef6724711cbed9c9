//! DiskMap
//!
//! An on-disk hash map persisted inside a chunk pool: a hash trie of
//! fixed 128-entry bucket arrays whose leaves are doubly-linked KV
//! node lists. Lists longer than 32 entries split into child arrays,
//! re-hashed with a per-array salt so parent-level collisions spread
//! out.
//!
//! The root array always lives in the pool's first chunk (position
//! 0); an empty backing stream gets one allocated on open.

mod bucket;
mod node;

use std::io::{Read, Seek, Write};

use parking_lot::RwLock;

use crate::error::{Result, VaultError};
use crate::pool::{ChunkPool, ChunkPtr};

use bucket::{
    find_in_list, find_leaf, upsert, BucketArray, BucketKind, BUCKET_ARRAY_SIZE, BUCKET_COUNT,
};
use node::KvNode;

/// Occupancy statistics for a map
#[derive(Debug, Clone, Copy)]
pub struct MapStats {
    /// Total chunks in the backing pool
    pub chunks: usize,
    /// Highest entries-per-slot ratio across all arrays
    pub max_load: f64,
    /// Deepest trie level (root = 1)
    pub max_depth: usize,
}

/// An on-disk byte-string → byte-string map
pub struct DiskMap<S> {
    lock: RwLock<()>,
    pool: ChunkPool<S>,
    root: ChunkPtr,
}

impl<S: Read + Write + Seek> DiskMap<S> {
    /// Open a map over `stream`, creating the root array if the
    /// stream is empty
    pub fn new(stream: S) -> Result<Self> {
        let pool = ChunkPool::new(stream)?;

        let root: ChunkPtr = 0;
        if pool.chunk_count() == 0 {
            let ptr = pool.alloc(BUCKET_ARRAY_SIZE)?;
            debug_assert_eq!(ptr, root);
            BucketArray::empty(ptr).store(&pool)?;
        } else {
            // Validate the root array eagerly.
            BucketArray::load(&pool, root)?;
        }

        Ok(Self {
            lock: RwLock::new(()),
            pool,
            root,
        })
    }

    /// Insert or update a key
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.lock.write();

        let value_ptr = self.pool.alloc_and_write(value)?;
        upsert(&self.pool, self.root, key, value_ptr)
    }

    /// Look up a key's value bytes
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.read();

        let (leaf, slot) = find_leaf(&self.pool, self.root, key)?;
        if leaf.entries[slot].head == 0 {
            return Ok(None);
        }

        match find_in_list(&self.pool, leaf.entries[slot].head, key)? {
            Some(node) => Ok(Some(node.value_bytes(&self.pool)?)),
            None => Ok(None),
        }
    }

    /// Remove a key
    ///
    /// Frees the node's chunk and its key and value chunks; fails
    /// with `KeyNotFound` if the key is absent.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let _guard = self.lock.write();

        let (mut leaf, slot) = find_leaf(&self.pool, self.root, key)?;
        if leaf.entries[slot].head == 0 {
            return Err(VaultError::KeyNotFound);
        }

        let node = find_in_list(&self.pool, leaf.entries[slot].head, key)?
            .ok_or(VaultError::KeyNotFound)?;
        let (key_ptr, value_ptr) = (node.key, node.value);

        let new_head = node.delete(&self.pool)?;
        self.pool.free(key_ptr)?;
        self.pool.free(value_ptr)?;

        leaf.entries[slot].head = new_head;
        leaf.store_entry(&self.pool, slot)
    }

    /// Visit every `(key, value)` pair, depth-first
    ///
    /// Stops early when the visitor returns `false`.
    pub fn for_each(&self, mut visitor: impl FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        let _guard = self.lock.read();

        let mut stack = vec![self.root];
        while let Some(ptr) = stack.pop() {
            let array = BucketArray::load(&self.pool, ptr)?;

            for entry in array.entries.iter() {
                match entry.kind {
                    BucketKind::Buckets => stack.push(entry.head),
                    BucketKind::List => {
                        if entry.head == 0 {
                            continue;
                        }

                        let mut node = Some(KvNode::load(&self.pool, entry.head)?);
                        while let Some(n) = node {
                            let key = n.key_bytes(&self.pool)?;
                            let value = n.value_bytes(&self.pool)?;
                            if !visitor(&key, &value) {
                                return Ok(());
                            }

                            node = n.next_node(&self.pool)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Trie occupancy: chunk count, worst per-array load, max depth
    pub fn stats(&self) -> Result<MapStats> {
        let _guard = self.lock.read();

        let mut stats = MapStats {
            chunks: self.pool.chunk_count(),
            max_load: 0.0,
            max_depth: 0,
        };

        let mut stack = vec![(self.root, 1usize)];
        while let Some((ptr, depth)) = stack.pop() {
            if depth > stats.max_depth {
                stats.max_depth = depth;
            }

            let array = BucketArray::load(&self.pool, ptr)?;
            let mut entries = 0u64;
            for entry in array.entries.iter() {
                match entry.kind {
                    BucketKind::Buckets => stack.push((entry.head, depth + 1)),
                    BucketKind::List => {
                        if entry.head != 0 {
                            let head = KvNode::load(&self.pool, entry.head)?;
                            entries += head.list_len(&self.pool)? as u64;
                        }
                    }
                }
            }

            let load = entries as f64 / BUCKET_COUNT as f64;
            if load > stats.max_load {
                stats.max_load = load;
            }
        }

        Ok(stats)
    }
}
