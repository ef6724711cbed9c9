//! KV node lists
//!
//! One cell of a bucket's doubly-linked key/value list. A node is a
//! chunk holding four little-endian i64 chunk pointers:
//! `{prev, next, key, value}`. Key and value bytes live in their own
//! chunks; the list only links pointers.

use std::io::{Read, Seek, Write};

use crate::error::{Result, VaultError};
use crate::pool::{ChunkPool, ChunkPtr};

/// Serialized node size: 4 chunk pointers of 8 bytes
pub(crate) const KV_NODE_SIZE: u32 = 32;

/// In-memory copy of one list node
#[derive(Debug, Clone, Copy)]
pub(crate) struct KvNode {
    /// This node's own chunk
    pub(crate) ptr: ChunkPtr,

    pub(crate) prev: ChunkPtr,
    pub(crate) next: ChunkPtr,
    pub(crate) key: ChunkPtr,
    pub(crate) value: ChunkPtr,
}

impl KvNode {
    /// Allocate and persist a fresh unlinked node
    pub(crate) fn create<S: Read + Write + Seek>(
        pool: &ChunkPool<S>,
        key: ChunkPtr,
        value: ChunkPtr,
    ) -> Result<Self> {
        let ptr = pool.alloc(KV_NODE_SIZE)?;
        let node = Self {
            ptr,
            prev: 0,
            next: 0,
            key,
            value,
        };
        node.store(pool)?;

        Ok(node)
    }

    /// Load the node stored at `ptr`
    pub(crate) fn load<S: Read + Write + Seek>(
        pool: &ChunkPool<S>,
        ptr: ChunkPtr,
    ) -> Result<Self> {
        let bytes = pool.read(ptr)?;
        if bytes.len() != KV_NODE_SIZE as usize {
            return Err(VaultError::Corruption(format!(
                "KV node at {ptr:#x} has {} bytes, expected {KV_NODE_SIZE}",
                bytes.len()
            )));
        }

        Ok(Self {
            ptr,
            prev: i64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            next: i64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            key: i64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            value: i64::from_le_bytes(bytes[24..32].try_into().unwrap()),
        })
    }

    /// Persist this node into its chunk
    pub(crate) fn store<S: Read + Write + Seek>(&self, pool: &ChunkPool<S>) -> Result<()> {
        let mut buf = [0u8; KV_NODE_SIZE as usize];
        buf[0..8].copy_from_slice(&self.prev.to_le_bytes());
        buf[8..16].copy_from_slice(&self.next.to_le_bytes());
        buf[16..24].copy_from_slice(&self.key.to_le_bytes());
        buf[24..32].copy_from_slice(&self.value.to_le_bytes());

        pool.write(self.ptr, &buf)
    }

    pub(crate) fn key_bytes<S: Read + Write + Seek>(&self, pool: &ChunkPool<S>) -> Result<Vec<u8>> {
        pool.read(self.key)
    }

    pub(crate) fn value_bytes<S: Read + Write + Seek>(
        &self,
        pool: &ChunkPool<S>,
    ) -> Result<Vec<u8>> {
        pool.read(self.value)
    }

    /// The successor node, if any
    pub(crate) fn next_node<S: Read + Write + Seek>(
        &self,
        pool: &ChunkPool<S>,
    ) -> Result<Option<Self>> {
        if self.next == 0 {
            return Ok(None);
        }

        Ok(Some(Self::load(pool, self.next)?))
    }

    /// Number of nodes from here to the tail
    pub(crate) fn list_len<S: Read + Write + Seek>(&self, pool: &ChunkPool<S>) -> Result<usize> {
        let mut node = *self;
        let mut len = 1;
        while node.next != 0 {
            node = Self::load(pool, node.next)?;
            len += 1;
        }

        Ok(len)
    }

    /// Append a new node at the list tail
    pub(crate) fn append<S: Read + Write + Seek>(
        &self,
        pool: &ChunkPool<S>,
        key: ChunkPtr,
        value: ChunkPtr,
    ) -> Result<Self> {
        let mut tail = *self;
        while tail.next != 0 {
            tail = Self::load(pool, tail.next)?;
        }

        let ptr = pool.alloc(KV_NODE_SIZE)?;
        let node = Self {
            ptr,
            prev: tail.ptr,
            next: 0,
            key,
            value,
        };
        node.store(pool)?;

        tail.next = ptr;
        tail.store(pool)?;

        Ok(node)
    }

    /// Replace the value pointer, returning the old one
    ///
    /// The caller is responsible for freeing the old value chunk.
    pub(crate) fn set_value<S: Read + Write + Seek>(
        &mut self,
        pool: &ChunkPool<S>,
        value: ChunkPtr,
    ) -> Result<ChunkPtr> {
        if !pool.contains(self.value) {
            return Err(VaultError::ChunkNotFound(self.value));
        }

        let old = self.value;
        self.value = value;
        self.store(pool)?;

        Ok(old)
    }

    /// Unlink this node, patching both neighbours, and free its
    /// chunk. Returns the list's new head pointer (0 when the list
    /// became empty). Key and value chunks are left alone.
    pub(crate) fn delete<S: Read + Write + Seek>(self, pool: &ChunkPool<S>) -> Result<ChunkPtr> {
        if self.prev == 0 {
            pool.free(self.ptr)?;

            if self.next != 0 {
                let mut next = Self::load(pool, self.next)?;
                next.prev = 0;
                next.store(pool)?;
            }

            return Ok(self.next);
        }

        let mut prev = Self::load(pool, self.prev)?;
        prev.next = self.next;
        prev.store(pool)?;

        if self.next != 0 {
            let mut next = Self::load(pool, self.next)?;
            next.prev = self.prev;
            next.store(pool)?;
        }

        pool.free(self.ptr)?;

        let mut head = prev;
        while head.prev != 0 {
            head = Self::load(pool, head.prev)?;
        }

        Ok(head.ptr)
    }

    /// Free every node chunk from this head to the tail
    ///
    /// Key and value chunks are preserved; callable only on a head.
    pub(crate) fn delete_all<S: Read + Write + Seek>(self, pool: &ChunkPool<S>) -> Result<()> {
        if self.prev != 0 {
            return Err(VaultError::InvalidArgument(
                "delete_all can only be called on the head node".to_string(),
            ));
        }

        let mut node = self;
        loop {
            pool.free(node.ptr)?;
            if node.next == 0 {
                return Ok(());
            }
            node = Self::load(pool, node.next)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn pool() -> ChunkPool<Cursor<Vec<u8>>> {
        ChunkPool::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn node_round_trip() {
        let pool = pool();
        let key = pool.alloc_and_write(b"k").unwrap();
        let value = pool.alloc_and_write(b"v").unwrap();

        let node = KvNode::create(&pool, key, value).unwrap();
        let got = KvNode::load(&pool, node.ptr).unwrap();

        assert_eq!(got.prev, 0);
        assert_eq!(got.next, 0);
        assert_eq!(got.key, key);
        assert_eq!(got.value, value);
        assert_eq!(got.key_bytes(&pool).unwrap(), b"k");
        assert_eq!(got.value_bytes(&pool).unwrap(), b"v");
    }

    #[test]
    fn append_links_both_ways() {
        let pool = pool();
        let k1 = pool.alloc_and_write(b"k1").unwrap();
        let v1 = pool.alloc_and_write(b"v1").unwrap();
        let k2 = pool.alloc_and_write(b"k2").unwrap();
        let v2 = pool.alloc_and_write(b"v2").unwrap();

        let head = KvNode::create(&pool, k1, v1).unwrap();
        let second = head.append(&pool, k2, v2).unwrap();

        let head = KvNode::load(&pool, head.ptr).unwrap();
        assert_eq!(head.next, second.ptr);
        assert_eq!(second.prev, head.ptr);
        assert_eq!(head.list_len(&pool).unwrap(), 2);
    }

    #[test]
    fn delete_middle_patches_neighbours() {
        let pool = pool();
        let mut ptrs = Vec::new();
        for i in 0..3u8 {
            ptrs.push((
                pool.alloc_and_write(&[b'k', i]).unwrap(),
                pool.alloc_and_write(&[b'v', i]).unwrap(),
            ));
        }

        let head = KvNode::create(&pool, ptrs[0].0, ptrs[0].1).unwrap();
        let middle = head.append(&pool, ptrs[1].0, ptrs[1].1).unwrap();
        head.append(&pool, ptrs[2].0, ptrs[2].1).unwrap();

        let new_head = middle.delete(&pool).unwrap();
        assert_eq!(new_head, head.ptr);

        let head = KvNode::load(&pool, head.ptr).unwrap();
        assert_eq!(head.list_len(&pool).unwrap(), 2);
        let tail = head.next_node(&pool).unwrap().unwrap();
        assert_eq!(tail.prev, head.ptr);
    }

    #[test]
    fn delete_head_promotes_successor() {
        let pool = pool();
        let k1 = pool.alloc_and_write(b"a").unwrap();
        let v1 = pool.alloc_and_write(b"1").unwrap();
        let k2 = pool.alloc_and_write(b"b").unwrap();
        let v2 = pool.alloc_and_write(b"2").unwrap();

        let head = KvNode::create(&pool, k1, v1).unwrap();
        let second = head.append(&pool, k2, v2).unwrap();

        let new_head = head.delete(&pool).unwrap();
        assert_eq!(new_head, second.ptr);

        let second = KvNode::load(&pool, second.ptr).unwrap();
        assert_eq!(second.prev, 0);
    }

    #[test]
    fn delete_all_requires_head() {
        let pool = pool();
        let k1 = pool.alloc_and_write(b"a").unwrap();
        let v1 = pool.alloc_and_write(b"1").unwrap();
        let k2 = pool.alloc_and_write(b"b").unwrap();
        let v2 = pool.alloc_and_write(b"2").unwrap();

        let head = KvNode::create(&pool, k1, v1).unwrap();
        let second = head.append(&pool, k2, v2).unwrap();

        assert!(second.delete_all(&pool).is_err());
        head.delete_all(&pool).unwrap();
    }
}
