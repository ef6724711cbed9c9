//! Bucket arrays
//!
//! A bucket array is a fixed 128-entry table serialized into a
//! single chunk. Each entry is either a list head (the start of a KV
//! node chain) or a pointer to a child bucket array, forming a hash
//! trie. The slot for a key is `fnv1a_32(salt ++ key) % 128`, where
//! the salt is the base-32 rendering of the array chunk's position —
//! every level of the trie hashes differently, so keys that collide
//! in a parent spread out in its child.

use std::io::{Read, Seek, Write};

use crate::error::{Result, VaultError};
use crate::pool::{ChunkPool, ChunkPtr};

use super::node::KvNode;

/// Entries per bucket array
pub(crate) const BUCKET_COUNT: usize = 128;

/// List length that triggers a split into a child array
pub(crate) const MAX_LIST_LEN: usize = 32;

/// Serialized entry size: kind (1) + head (8)
const BUCKET_ENTRY_SIZE: usize = 9;

/// Serialized bucket array size
pub(crate) const BUCKET_ARRAY_SIZE: u32 = (BUCKET_COUNT * BUCKET_ENTRY_SIZE) as u32;

/// What a bucket entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BucketKind {
    /// Head of a KV node list (0 = empty)
    List,
    /// A child bucket array chunk
    Buckets,
}

impl BucketKind {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::List),
            1 => Ok(Self::Buckets),
            other => Err(VaultError::Corruption(format!(
                "invalid bucket type {other}"
            ))),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::List => 0,
            Self::Buckets => 1,
        }
    }
}

/// One slot of a bucket array
#[derive(Debug, Clone, Copy)]
pub(crate) struct BucketEntry {
    pub(crate) kind: BucketKind,
    pub(crate) head: ChunkPtr,
}

/// A 128-entry bucket array and the chunk it lives in
pub(crate) struct BucketArray {
    pub(crate) ptr: ChunkPtr,
    pub(crate) entries: [BucketEntry; BUCKET_COUNT],
}

impl BucketArray {
    /// A zeroed array (all slots empty lists)
    pub(crate) fn empty(ptr: ChunkPtr) -> Self {
        Self {
            ptr,
            entries: [BucketEntry {
                kind: BucketKind::List,
                head: 0,
            }; BUCKET_COUNT],
        }
    }

    /// Load the array stored in the chunk at `ptr`
    pub(crate) fn load<S: Read + Write + Seek>(
        pool: &ChunkPool<S>,
        ptr: ChunkPtr,
    ) -> Result<Self> {
        let bytes = pool.read(ptr)?;
        if bytes.len() != BUCKET_ARRAY_SIZE as usize {
            return Err(VaultError::Corruption(format!(
                "expected to read {BUCKET_ARRAY_SIZE} bytes, read {}",
                bytes.len()
            )));
        }

        let mut array = Self::empty(ptr);
        for (i, entry) in array.entries.iter_mut().enumerate() {
            let off = i * BUCKET_ENTRY_SIZE;
            entry.kind = BucketKind::from_u8(bytes[off])?;
            entry.head = i64::from_le_bytes(bytes[off + 1..off + 9].try_into().unwrap());
        }

        Ok(array)
    }

    /// Persist the whole array into its chunk
    pub(crate) fn store<S: Read + Write + Seek>(&self, pool: &ChunkPool<S>) -> Result<()> {
        let mut buf = vec![0u8; BUCKET_ARRAY_SIZE as usize];
        for (i, entry) in self.entries.iter().enumerate() {
            let off = i * BUCKET_ENTRY_SIZE;
            buf[off] = entry.kind.as_u8();
            buf[off + 1..off + 9].copy_from_slice(&entry.head.to_le_bytes());
        }

        pool.write(self.ptr, &buf)
    }

    /// Persist a single slot in place
    pub(crate) fn store_entry<S: Read + Write + Seek>(
        &self,
        pool: &ChunkPool<S>,
        slot: usize,
    ) -> Result<()> {
        let entry = self.entries[slot];

        let mut buf = [0u8; BUCKET_ENTRY_SIZE];
        buf[0] = entry.kind.as_u8();
        buf[1..9].copy_from_slice(&entry.head.to_le_bytes());

        pool.write_at(self.ptr, &buf, (slot * BUCKET_ENTRY_SIZE) as u32)
    }

    /// Slot index for `key` at this level of the trie
    pub(crate) fn slot_of(&self, key: &[u8]) -> usize {
        let salt = format_base32(self.ptr);

        (hash_key(salt.as_bytes(), key) as usize) % BUCKET_COUNT
    }
}

/// FNV-1a over the salt followed by the key
///
/// The 32-bit variant is part of the on-disk format; the `fnv`
/// crate only ships the 64-bit hasher.
fn hash_key(salt: &[u8], key: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 16_777_619;

    let mut hash = OFFSET_BASIS;
    for &byte in salt.iter().chain(key) {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }

    hash
}

/// Base-32 rendering of an integer, lowercase digits
fn format_base32(v: i64) -> String {
    const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

    if v == 0 {
        return "0".to_string();
    }

    let negative = v < 0;
    let mut n = v.unsigned_abs();
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 32) as usize]);
        n /= 32;
    }
    if negative {
        buf.push(b'-');
    }
    buf.reverse();

    String::from_utf8(buf).expect("base-32 digits are ASCII")
}

// =============================================================================
// Trie Walks
// =============================================================================

/// Descend from the array at `start` to the leaf list slot for `key`
pub(crate) fn find_leaf<S: Read + Write + Seek>(
    pool: &ChunkPool<S>,
    start: ChunkPtr,
    key: &[u8],
) -> Result<(BucketArray, usize)> {
    let mut array = BucketArray::load(pool, start)?;

    loop {
        let slot = array.slot_of(key);
        match array.entries[slot].kind {
            BucketKind::List => return Ok((array, slot)),
            BucketKind::Buckets => {
                array = BucketArray::load(pool, array.entries[slot].head)?;
            }
        }
    }
}

/// Scan a node list for the node whose key bytes equal `key`
pub(crate) fn find_in_list<S: Read + Write + Seek>(
    pool: &ChunkPool<S>,
    head: ChunkPtr,
    key: &[u8],
) -> Result<Option<KvNode>> {
    let mut node = KvNode::load(pool, head)?;

    loop {
        if node.key_bytes(pool)? == key {
            return Ok(Some(node));
        }
        match node.next_node(pool)? {
            Some(next) => node = next,
            None => return Ok(None),
        }
    }
}

/// Insert or update `key` in the trie rooted at `root`
///
/// `value` must already be written to its own chunk; on an update
/// the previous value chunk is freed.
pub(crate) fn upsert<S: Read + Write + Seek>(
    pool: &ChunkPool<S>,
    root: ChunkPtr,
    key: &[u8],
    value: ChunkPtr,
) -> Result<()> {
    let (mut leaf, slot) = find_leaf(pool, root, key)?;

    if leaf.entries[slot].head != 0 {
        if let Some(mut node) = find_in_list(pool, leaf.entries[slot].head, key)? {
            let old = node.set_value(pool, value)?;
            return pool.free(old);
        }
    }

    let key_chunk = pool.alloc_and_write(key)?;
    append(pool, &mut leaf, slot, key, key_chunk, value)
}

/// Append a `(key, value)` pair to the list at `slot`, splitting the
/// list into a child array when it is already at `MAX_LIST_LEN`.
fn append<S: Read + Write + Seek>(
    pool: &ChunkPool<S>,
    array: &mut BucketArray,
    slot: usize,
    key_bytes: &[u8],
    key: ChunkPtr,
    value: ChunkPtr,
) -> Result<()> {
    if array.entries[slot].kind != BucketKind::List {
        return Err(VaultError::Corruption(
            "cannot append to a non-list bucket".to_string(),
        ));
    }

    if array.entries[slot].head == 0 {
        let node = KvNode::create(pool, key, value)?;
        array.entries[slot] = BucketEntry {
            kind: BucketKind::List,
            head: node.ptr,
        };

        return array.store_entry(pool, slot);
    }

    let head = KvNode::load(pool, array.entries[slot].head)?;
    if head.list_len(pool)? < MAX_LIST_LEN {
        head.append(pool, key, value)?;

        return Ok(());
    }

    split(pool, array, slot, head, key_bytes, key, value)
}

/// Convert a full list into a child bucket array
///
/// Every existing node is re-created inside the child (reusing its
/// key and value chunks), the incoming pair is appended, the parent
/// slot flips to `Buckets`, and the old node chunks are freed.
fn split<S: Read + Write + Seek>(
    pool: &ChunkPool<S>,
    array: &mut BucketArray,
    slot: usize,
    head: KvNode,
    key_bytes: &[u8],
    key: ChunkPtr,
    value: ChunkPtr,
) -> Result<()> {
    let child_ptr = pool.alloc(BUCKET_ARRAY_SIZE)?;
    BucketArray::empty(child_ptr).store(pool)?;

    let mut node = Some(head);
    while let Some(n) = node {
        let node_key = n.key_bytes(pool)?;
        let (mut leaf, leaf_slot) = find_leaf(pool, child_ptr, &node_key)?;
        append(pool, &mut leaf, leaf_slot, &node_key, n.key, n.value)?;

        node = n.next_node(pool)?;
    }

    let (mut leaf, leaf_slot) = find_leaf(pool, child_ptr, key_bytes)?;
    append(pool, &mut leaf, leaf_slot, key_bytes, key, value)?;

    array.entries[slot] = BucketEntry {
        kind: BucketKind::Buckets,
        head: child_ptr,
    };
    array.store_entry(pool, slot)?;

    head.delete_all(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base32_formatting() {
        assert_eq!(format_base32(0), "0");
        assert_eq!(format_base32(31), "v");
        assert_eq!(format_base32(32), "10");
        assert_eq!(format_base32(1161), "149");
        assert_eq!(format_base32(-33), "-11");
    }

    #[test]
    fn fnv1a_reference_vectors() {
        assert_eq!(hash_key(b"", b""), 0x811c_9dc5);
        assert_eq!(hash_key(b"", b"a"), 0xe40c_292c);
        assert_eq!(hash_key(b"f", b"oobar"), 0xbf9c_f968);
    }

    #[test]
    fn salt_changes_slots_across_levels() {
        let a = BucketArray::empty(0);
        let b = BucketArray::empty(1161);

        // Not a proof, but these keys land apart at the two salts.
        let moved = (0..64u8).any(|i| {
            let key = [b'k', i];
            a.slot_of(&key) != b.slot_of(&key)
        });
        assert!(moved);
    }
}
