//! Objects
//!
//! An object is a named, ordered chain of blocks presenting stream
//! I/O. It implements `std::io::{Read, Write, Seek}` over the chain:
//! reads and writes span block boundaries transparently, and writes
//! past the tail allocate new blocks (free-list blocks first, then
//! file growth).

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::error::{Result, VaultError};

use super::{BlockFile, BlockMeta, FileState, BLOCK_META_SIZE};

/// A block-chain stream with a cursor
///
/// The cursor is tracked as `(pos_block, pos_block_off)`: the index
/// into the resolved chain and the byte offset within that block's
/// payload. All file access goes through the shared `BlockFile`
/// lock; cursor state is exclusive to this handle.
#[derive(Debug)]
pub struct Object<F> {
    file: Arc<BlockFile<F>>,

    blocks: Vec<BlockMeta>,
    offset: u64,
    pos_block: usize,
    pos_block_off: u32,
}

/// Size and occupancy of one object
#[derive(Debug, Clone, Copy)]
pub struct ObjectStats {
    /// Logical size in bytes
    pub size: u64,
    /// Number of blocks in the chain
    pub blocks: usize,
    /// Payload bytes still available in the tail block
    pub free: u32,
}

impl<F: Read + Write + Seek> Object<F> {
    pub(crate) fn new(file: Arc<BlockFile<F>>, blocks: Vec<BlockMeta>) -> Self {
        debug_assert!(!blocks.is_empty());

        Self {
            file,
            blocks,
            offset: 0,
            pos_block: 0,
            pos_block_off: 0,
        }
    }

    /// Logical size: the sum of every block's `end`
    pub fn size(&self) -> u64 {
        self.blocks.iter().map(|b| u64::from(b.end)).sum()
    }

    /// Size and occupancy of this object
    pub fn stats(&self) -> ObjectStats {
        let capacity = self.file.block_size - BLOCK_META_SIZE;
        let last = self.blocks[self.blocks.len() - 1];

        ObjectStats {
            size: self.size(),
            blocks: self.blocks.len(),
            free: capacity - last.end,
        }
    }

    fn read_impl(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut st = self.file.state.lock();
        let mut total = 0;

        while total < buf.len() {
            let block = self.blocks[self.pos_block];
            if self.pos_block_off == block.end {
                break;
            }

            let can = ((block.end - self.pos_block_off) as usize).min(buf.len() - total);
            let payload = block.pos + u64::from(BLOCK_META_SIZE);
            st.file
                .seek(SeekFrom::Start(payload + u64::from(self.pos_block_off)))?;
            st.file.read_exact(&mut buf[total..total + can])?;

            self.offset += can as u64;
            self.pos_block_off += can as u32;
            if self.pos_block_off == block.end && block.next != 0 {
                self.pos_block += 1;
                self.pos_block_off = 0;
            }

            total += can;
        }

        Ok(total)
    }

    fn write_impl(&mut self, buf: &[u8]) -> Result<usize> {
        let mut st = self.file.state.lock();
        let capacity = st.payload_capacity();
        let block_size = u64::from(st.header.block_size);
        let mut total = 0;

        loop {
            let block = self.blocks[self.pos_block];
            let can = ((capacity - self.pos_block_off) as usize).min(buf.len() - total);
            let payload = block.pos + u64::from(BLOCK_META_SIZE);
            st.file
                .seek(SeekFrom::Start(payload + u64::from(self.pos_block_off)))?;
            st.file.write_all(&buf[total..total + can])?;

            self.offset += can as u64;
            self.pos_block_off += can as u32;
            if self.pos_block_off > block.end {
                self.blocks[self.pos_block].end = self.pos_block_off;
                self.blocks[self.pos_block].write_end(&mut st.file)?;
            }

            total += can;
            if total == buf.len() {
                return Ok(total);
            }

            if self.pos_block_off == capacity {
                if self.blocks[self.pos_block].next == 0 {
                    let remaining = (buf.len() - total) as u64;
                    let needed = remaining.div_ceil(block_size).max(1) as u32;
                    Self::extend_chain(&mut self.blocks, &mut st, needed)?;
                }
                self.pos_block += 1;
                self.pos_block_off = 0;
            }
        }
    }

    /// Append `n` blocks to the chain tail: free-list blocks first,
    /// then file growth for the remainder.
    fn extend_chain(blocks: &mut Vec<BlockMeta>, st: &mut FileState<F>, n: u32) -> Result<()> {
        let mut remaining = n;

        let mut taken: Vec<BlockMeta> = Vec::new();
        let mut next = st.header.first_free_block;
        while remaining > 0 && next != 0 {
            let meta = st.read_block(next)?;
            next = meta.next;
            taken.push(meta);
            remaining -= 1;
        }

        if !taken.is_empty() {
            st.header.first_free_block = next;
            let header = st.header;
            header.write_first_free_block(&mut st.file)?;

            let last = taken.last_mut().expect("taken is non-empty");
            last.next = 0;
            last.write_next(&mut st.file)?;

            let tail = blocks.last_mut().expect("chain is non-empty");
            tail.next = taken[0].idx;
            tail.write_next(&mut st.file)?;
            blocks.extend_from_slice(&taken);

            if remaining == 0 {
                return Ok(());
            }
        }

        let grown = st.grow(remaining, false)?;
        let tail = blocks.last_mut().expect("chain is non-empty");
        tail.next = grown[0].idx;
        tail.write_next(&mut st.file)?;
        blocks.extend_from_slice(&grown);

        Ok(())
    }

    fn seek_impl(&mut self, pos: SeekFrom) -> Result<u64> {
        match pos {
            SeekFrom::Start(off) => {
                self.offset = 0;
                self.pos_block = 0;
                self.pos_block_off = 0;

                self.seek_forward(off)
            }
            SeekFrom::End(off) => {
                self.offset = self.size();
                self.pos_block = self.blocks.len() - 1;
                self.pos_block_off = self.blocks[self.pos_block].end;

                if off > 0 {
                    return Err(VaultError::EndOfStream);
                }
                self.seek_backward(off.unsigned_abs())
            }
            SeekFrom::Current(off) => {
                if off >= 0 {
                    self.seek_forward(off as u64)
                } else {
                    self.seek_backward(off.unsigned_abs())
                }
            }
        }
    }

    fn seek_forward(&mut self, mut dist: u64) -> Result<u64> {
        while dist > 0 {
            let block = self.blocks[self.pos_block];
            if self.pos_block_off == block.end {
                return Err(VaultError::EndOfStream);
            }

            let can = u64::from(block.end - self.pos_block_off).min(dist);
            self.offset += can;
            self.pos_block_off += can as u32;
            if self.pos_block_off == block.end && block.next != 0 {
                self.pos_block += 1;
                self.pos_block_off = 0;
            }

            dist -= can;
        }

        Ok(self.offset)
    }

    fn seek_backward(&mut self, mut dist: u64) -> Result<u64> {
        while dist > 0 {
            if self.pos_block_off == 0 {
                if self.pos_block == 0 {
                    return Err(VaultError::EndOfStream);
                }
                self.pos_block -= 1;
                self.pos_block_off = self.blocks[self.pos_block].end;
                continue;
            }

            let can = u64::from(self.pos_block_off).min(dist);
            self.offset -= can;
            self.pos_block_off -= can as u32;
            dist -= can;
        }

        Ok(self.offset)
    }
}

// =============================================================================
// std::io Implementations
// =============================================================================

fn into_io(err: VaultError) -> io::Error {
    match err {
        VaultError::Io(err) => err,
        VaultError::EndOfStream => io::Error::new(io::ErrorKind::UnexpectedEof, err),
        other => io::Error::other(other),
    }
}

impl<F: Read + Write + Seek> Read for Object<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_impl(buf).map_err(into_io)
    }
}

impl<F: Read + Write + Seek> Write for Object<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_impl(buf).map_err(into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F: Read + Write + Seek> Seek for Object<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_impl(pos).map_err(into_io)
    }
}
