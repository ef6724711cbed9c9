//! Shared block-file arena
//!
//! `BlockFile` owns the backing stream, the DB header, and the
//! free-list primitives. It is the single point of serialization for
//! file access: objects and the block DB share it through an `Arc`
//! and take its lock for every read or write.

use std::io::{Read, Seek, SeekFrom, Write};

use parking_lot::Mutex;

use crate::error::{Result, VaultError};

use super::{BlockMeta, DbHeader, BLOCK_META_SIZE, DB_HEADER_SIZE};

/// The shared arena: stream + header behind one lock
#[derive(Debug)]
pub(crate) struct BlockFile<F> {
    /// Block size copy, immutable after create/open
    pub(crate) block_size: u32,

    pub(crate) state: Mutex<FileState<F>>,
}

/// Mutable file state, guarded by the `BlockFile` lock
#[derive(Debug)]
pub(crate) struct FileState<F> {
    pub(crate) file: F,
    pub(crate) header: DbHeader,
}

impl<F: Read + Write + Seek> BlockFile<F> {
    pub(crate) fn new(file: F, header: DbHeader) -> Self {
        Self {
            block_size: header.block_size,
            state: Mutex::new(FileState { file, header }),
        }
    }
}

impl<F: Read + Write + Seek> FileState<F> {
    /// File position of the block at `idx`
    pub(crate) fn block_pos(&self, idx: u32) -> u64 {
        u64::from(DB_HEADER_SIZE) + u64::from(idx) * u64::from(self.header.block_size)
    }

    /// Read the header of the block at `idx`
    pub(crate) fn read_block(&mut self, idx: u32) -> Result<BlockMeta> {
        let pos = self.block_pos(idx);
        BlockMeta::load(&mut self.file, pos, idx)
    }

    /// Total size of the backing stream in bytes
    pub(crate) fn file_size(&mut self) -> Result<u64> {
        Ok(self.file.seek(SeekFrom::End(0))?)
    }

    /// Append `n` zeroed blocks to the file and chain them together.
    ///
    /// When `free` is set the new run is spliced onto the free-list
    /// tail and nothing is returned; otherwise the caller owns the
    /// returned chain (last block's `next` is 0).
    pub(crate) fn grow(&mut self, n: u32, free: bool) -> Result<Vec<BlockMeta>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let block_size = self.header.block_size as usize;
        let start_idx = self.header.block_count;
        let start_pos = self.block_pos(start_idx);

        // Build the zeroed run with its headers patched in, then
        // write it in one pass.
        let mut buf = vec![0u8; n as usize * block_size];
        let mut metas = Vec::with_capacity(n as usize);
        for i in 0..n {
            let mut next = start_idx + i + 1;
            if i == n - 1 {
                next = 0;
            }
            let meta = BlockMeta {
                pos: start_pos + u64::from(i) * block_size as u64,
                idx: start_idx + i,
                end: 0,
                next,
            };

            let off = i as usize * block_size;
            buf[off..off + 4].copy_from_slice(&meta.end.to_le_bytes());
            buf[off + 4..off + 8].copy_from_slice(&meta.next.to_le_bytes());
            metas.push(meta);
        }

        self.file.seek(SeekFrom::Start(start_pos))?;
        self.file.write_all(&buf)?;

        self.header.block_count += n;
        let header = self.header;
        header.write_block_count(&mut self.file)?;

        if !free {
            return Ok(metas);
        }

        if self.header.first_free_block == 0 {
            self.header.first_free_block = start_idx;
            let header = self.header;
            header.write_first_free_block(&mut self.file)?;
        } else {
            let last_free = self.find_last_free_block()?;
            let mut meta = self.read_block(last_free)?;
            meta.next = start_idx;
            meta.store(&mut self.file)?;
        }

        Ok(Vec::new())
    }

    /// Walk the free list to its tail and return the tail's index
    fn find_last_free_block(&mut self) -> Result<u32> {
        let mut idx = self.header.first_free_block;
        let mut meta = self.read_block(idx)?;

        while meta.next != 0 {
            idx = meta.next;
            meta = self.read_block(idx)?;
        }

        if idx == 0 {
            return Err(VaultError::Corruption(
                "last free block cannot be at position 0".to_string(),
            ));
        }

        Ok(idx)
    }

    /// Allocate one block: pop the free-list head, or grow the file
    pub(crate) fn alloc_single(&mut self) -> Result<BlockMeta> {
        if self.header.first_free_block != 0 {
            let mut meta = self.read_block(self.header.first_free_block)?;

            self.header.first_free_block = meta.next;
            let header = self.header;
            header.write_first_free_block(&mut self.file)?;

            meta.next = 0;
            meta.write_next(&mut self.file)?;

            return Ok(meta);
        }

        let mut grown = self.grow(1, false)?;
        Ok(grown.remove(0))
    }

    /// Return the block at `idx` and its entire `next` chain to the
    /// free list. Freed blocks get `end = 0`.
    pub(crate) fn free_chain(&mut self, idx: u32) -> Result<()> {
        let mut idx = idx;

        loop {
            let mut meta = self.read_block(idx)?;
            let next = meta.next;

            meta.next = self.header.first_free_block;
            meta.end = 0;
            meta.store(&mut self.file)?;

            self.header.first_free_block = idx;
            let header = self.header;
            header.write_first_free_block(&mut self.file)?;

            if next == 0 {
                return Ok(());
            }
            idx = next;
        }
    }

    /// Resolve the chain starting at `start` into block descriptors
    pub(crate) fn read_chain(&mut self, start: u32) -> Result<Vec<BlockMeta>> {
        let mut blocks = vec![self.read_block(start)?];

        while blocks[blocks.len() - 1].next != 0 {
            let next = blocks[blocks.len() - 1].next;
            blocks.push(self.read_block(next)?);
        }

        Ok(blocks)
    }

    /// Count the blocks reachable from `first_free_block`
    pub(crate) fn count_free_blocks(&mut self) -> Result<u32> {
        if self.header.first_free_block == 0 {
            return Ok(0);
        }

        let mut meta = self.read_block(self.header.first_free_block)?;
        let mut count = 1;
        while meta.next != 0 {
            meta = self.read_block(meta.next)?;
            count += 1;
        }

        Ok(count)
    }

    /// Read every block header in index order (debugging aid)
    pub(crate) fn all_blocks(&mut self) -> Result<Vec<BlockMeta>> {
        let mut blocks = Vec::with_capacity(self.header.block_count as usize);
        for idx in 0..self.header.block_count {
            blocks.push(self.read_block(idx)?);
        }

        Ok(blocks)
    }

    /// Payload capacity of one block
    pub(crate) fn payload_capacity(&self) -> u32 {
        self.header.block_size - BLOCK_META_SIZE
    }
}
