//! Block DB
//!
//! Ties the block file to a directory of named objects. Object
//! metadata lives as JSON chunks in the *index pool*: a chunk pool
//! whose backing object starts at the reserved block 0. Opening a
//! file walks block 0's chain, rescans the index pool, and
//! deserializes every allocated chunk back into the name map.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::pool::{ChunkPool, ChunkPtr};
use crate::Options;

use super::{BlockFile, BlockMeta, DbHeader, Object, ObjectStats, BLOCK_META_SIZE};

/// Metadata of one named object, persisted as JSON in the index pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Location of this object's metadata chunk
    #[serde(skip)]
    pub(crate) chunk: ChunkPtr,

    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "StartBlock")]
    pub start_block: u32,
    #[serde(rename = "Deleted")]
    pub deleted: bool,
}

/// Aggregate statistics for a block DB
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub header: DbHeader,

    pub objects: u32,
    pub index_object: ObjectStats,
    pub free_blocks: u32,
    pub block_meta_size: u32,
}

/// A block file plus its directory of named objects
#[derive(Debug)]
pub struct BlockDb<F> {
    file: Arc<BlockFile<F>>,
    index: ChunkPool<Object<F>>,
    objects: Mutex<HashMap<String, ObjectMeta>>,
}

impl<F: Read + Write + Seek> BlockDb<F> {
    /// Create a new block file on an empty stream
    ///
    /// Writes the DB header and allocates block 0 for the index
    /// object. Fails with `AlreadyExists` if the stream is not
    /// empty.
    pub fn create(mut file: F, options: Options) -> Result<Self> {
        let size = file.seek(SeekFrom::End(0))?;
        if size != 0 {
            return Err(VaultError::AlreadyExists(size));
        }
        options.validate()?;

        let header = DbHeader::new(options.block_size);
        file.seek(SeekFrom::Start(0))?;
        header.write_to(&mut file)?;

        let file = Arc::new(BlockFile::new(file, header));
        let block0 = {
            let mut st = file.state.lock();
            st.grow(1, false)?.remove(0)
        };

        let index_obj = Object::new(Arc::clone(&file), vec![block0]);
        let index = ChunkPool::new(index_obj)?;

        tracing::debug!(block_size = header.block_size, "created block file");

        Ok(Self {
            file,
            index,
            objects: Mutex::new(HashMap::new()),
        })
    }

    /// Open an existing block file
    ///
    /// Validates the header, reconstructs the index object from
    /// block 0's chain, and loads every object's metadata.
    pub fn open(mut file: F) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        let header = DbHeader::read_from(&mut file)?;

        let file = Arc::new(BlockFile::new(file, header));
        let chain = {
            let mut st = file.state.lock();
            st.read_chain(0)?
        };

        let index_obj = Object::new(Arc::clone(&file), chain);
        let index = ChunkPool::new(index_obj)?;

        let mut objects = HashMap::new();
        for ptr in index.allocated() {
            let bytes = index.read(ptr)?;
            let mut meta: ObjectMeta = serde_json::from_slice(&bytes)?;
            meta.chunk = ptr;
            objects.insert(meta.name.clone(), meta);
        }

        tracing::debug!(
            block_count = header.block_count,
            objects = objects.len(),
            "opened block file"
        );

        Ok(Self {
            file,
            index,
            objects: Mutex::new(objects),
        })
    }

    // =========================================================================
    // Named Objects
    // =========================================================================

    /// Create an object, truncating it if the name already exists
    ///
    /// On an existing name the start block is retained: its header
    /// is zeroed, the rest of the chain goes back to the free list,
    /// and the metadata chunk is rewritten in place.
    pub fn create_object(&self, name: &str) -> Result<Object<F>> {
        let mut objects = self.objects.lock();

        if let Some(meta) = objects.get(name).cloned() {
            let block = {
                let mut st = self.file.state.lock();
                let mut block = st.read_block(meta.start_block)?;
                let next = block.next;
                block.next = 0;
                block.end = 0;
                block.store(&mut st.file)?;
                if next != 0 {
                    st.free_chain(next)?;
                }
                block
            };

            self.index.write(meta.chunk, &serde_json::to_vec(&meta)?)?;

            return Ok(Object::new(Arc::clone(&self.file), vec![block]));
        }

        let block = {
            let mut st = self.file.state.lock();
            st.alloc_single()?
        };

        let mut meta = ObjectMeta {
            chunk: 0,
            name: name.to_string(),
            start_block: block.idx,
            deleted: false,
        };
        let bytes = serde_json::to_vec(&meta)?;
        meta.chunk = self.index.alloc_and_write(&bytes)?;

        objects.insert(name.to_string(), meta);
        tracing::debug!(name, start_block = block.idx, "created object");

        Ok(Object::new(Arc::clone(&self.file), vec![block]))
    }

    /// Open an existing object by name
    pub fn open_object(&self, name: &str) -> Result<Object<F>> {
        let objects = self.objects.lock();
        let meta = objects
            .get(name)
            .ok_or_else(|| VaultError::ObjectNotFound(name.to_string()))?;

        let chain = {
            let mut st = self.file.state.lock();
            st.read_chain(meta.start_block)?
        };

        Ok(Object::new(Arc::clone(&self.file), chain))
    }

    /// Delete an object: free its metadata chunk and its block chain
    pub fn delete_object(&self, name: &str) -> Result<()> {
        let mut objects = self.objects.lock();
        let meta = objects
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::ObjectNotFound(name.to_string()))?;

        self.index.free(meta.chunk)?;

        {
            let mut st = self.file.state.lock();
            st.free_chain(meta.start_block)?;
        }

        objects.remove(name);
        tracing::debug!(name, "deleted object");

        Ok(())
    }

    /// Whether an object with this name exists
    pub fn contains_object(&self, name: &str) -> bool {
        self.objects.lock().contains_key(name)
    }

    /// Metadata of every object
    pub fn objects(&self) -> Vec<ObjectMeta> {
        self.objects.lock().values().cloned().collect()
    }

    // =========================================================================
    // File-level Operations
    // =========================================================================

    /// Extend the file by `n` blocks and add them to the free list
    pub fn grow(&self, n: u32) -> Result<()> {
        let mut st = self.file.state.lock();
        st.grow(n, true)?;

        Ok(())
    }

    /// Current size of the backing stream in bytes
    pub fn file_size(&self) -> Result<u64> {
        self.file.state.lock().file_size()
    }

    /// A copy of the DB header
    pub fn header(&self) -> DbHeader {
        self.file.state.lock().header
    }

    /// Every block header in index order (debugging aid)
    pub fn blocks(&self) -> Result<Vec<BlockMeta>> {
        self.file.state.lock().all_blocks()
    }

    /// Aggregate statistics: header, object count, index object
    /// occupancy, and free-list length
    pub fn stats(&self) -> Result<Stats> {
        let objects = self.objects.lock().len() as u32;
        let index_object = self.index.with_stream(|obj| obj.stats());
        let (header, free_blocks) = {
            let mut st = self.file.state.lock();
            (st.header, st.count_free_blocks()?)
        };

        Ok(Stats {
            header,
            objects,
            index_object,
            free_blocks,
            block_meta_size: BLOCK_META_SIZE,
        })
    }
}
