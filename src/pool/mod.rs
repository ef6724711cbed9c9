//! Chunk Pool
//!
//! A variable-length slab allocator inside one backing stream
//! (typically a block-layer `Object`, or an in-memory cursor in
//! tests). The pool is append-only at the stream level: chunks are
//! never physically removed, so a `ChunkPtr` — the byte offset of a
//! chunk's header — stays valid for the lifetime of the pool. Freed
//! chunks are flagged and reused by first fit.
//!
//! ## Stream Layout
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Cap u32 | Size u32 | Free u8 | payload (Cap) │
//! ├──────────────────────────────────────────────┤
//! │ Cap u32 | Size u32 | Free u8 | payload (Cap) │
//! │   ... repeated until end of stream ...       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Opening a pool is a linear scan: read a header, skip `Cap`
//! bytes, repeat until the stream is exhausted.

mod chunk;

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Seek, SeekFrom, Write};

use parking_lot::Mutex;

use crate::error::{Result, VaultError};

pub(crate) use chunk::{ChunkMeta, CHUNK_HEADER_SIZE};

/// Stable address of a chunk: the byte offset of its header within
/// the backing stream
pub type ChunkPtr = i64;

/// A chunk allocator over one backing stream
///
/// All methods take `&self`; the stream and the chunk table live
/// behind a single lock, since even reads move the stream cursor.
#[derive(Debug)]
pub struct ChunkPool<S> {
    inner: Mutex<PoolInner<S>>,
}

#[derive(Debug)]
struct PoolInner<S> {
    stream: S,
    chunks: HashMap<ChunkPtr, ChunkMeta>,
    free_chunks: BTreeSet<ChunkPtr>,
}

impl<S: Read + Write + Seek> ChunkPool<S> {
    /// Open a pool, scanning every chunk header in the stream
    pub fn new(mut stream: S) -> Result<Self> {
        let len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;

        let mut chunks = HashMap::new();
        let mut free_chunks = BTreeSet::new();

        let mut pos: u64 = 0;
        while pos < len {
            if len - pos < u64::from(CHUNK_HEADER_SIZE) {
                return Err(VaultError::Corruption(format!(
                    "truncated chunk header at {pos:#x}"
                )));
            }

            let mut buf = [0u8; CHUNK_HEADER_SIZE as usize];
            stream.read_exact(&mut buf)?;
            let meta = ChunkMeta::decode(&buf);

            let payload_end = pos + u64::from(CHUNK_HEADER_SIZE) + u64::from(meta.cap);
            if payload_end > len {
                return Err(VaultError::Corruption(format!(
                    "chunk at {pos:#x} extends past end of stream"
                )));
            }

            chunks.insert(pos as ChunkPtr, meta);
            if meta.free {
                free_chunks.insert(pos as ChunkPtr);
            }

            pos = stream.seek(SeekFrom::Current(i64::from(meta.cap)))?;
        }

        Ok(Self {
            inner: Mutex::new(PoolInner {
                stream,
                chunks,
                free_chunks,
            }),
        })
    }

    /// Number of chunks, free or not
    pub fn chunk_count(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    /// Pointers of every allocated (non-free) chunk, in stream order
    pub fn allocated(&self) -> Vec<ChunkPtr> {
        let inner = self.inner.lock();

        let mut ptrs: Vec<ChunkPtr> = inner
            .chunks
            .iter()
            .filter(|(_, meta)| !meta.free)
            .map(|(&ptr, _)| ptr)
            .collect();
        ptrs.sort_unstable();

        ptrs
    }

    /// Whether a chunk exists at `ptr`
    pub fn contains(&self, ptr: ChunkPtr) -> bool {
        self.inner.lock().chunks.contains_key(&ptr)
    }

    /// Allocate a chunk with capacity for `n` bytes
    ///
    /// Reuses the first free chunk whose capacity fits, otherwise
    /// appends a fresh zero-filled chunk at the end of the stream.
    pub fn alloc(&self, n: u32) -> Result<ChunkPtr> {
        let mut inner = self.inner.lock();

        let reusable = inner
            .free_chunks
            .iter()
            .copied()
            .find(|ptr| inner.chunks[ptr].cap >= n);
        if let Some(ptr) = reusable {
            let mut meta = inner.chunks[&ptr];
            meta.size = 0;
            meta.free = false;
            inner.write_header(ptr, meta)?;

            inner.chunks.insert(ptr, meta);
            inner.free_chunks.remove(&ptr);

            return Ok(ptr);
        }

        let meta = ChunkMeta {
            cap: n,
            size: 0,
            free: false,
        };
        let pos = inner.stream.seek(SeekFrom::End(0))?;
        inner.stream.write_all(&meta.encode())?;
        inner.stream.write_all(&vec![0u8; n as usize])?;

        let ptr = pos as ChunkPtr;
        inner.chunks.insert(ptr, meta);

        Ok(ptr)
    }

    /// Allocate a chunk sized for `bytes` and write them
    ///
    /// Frees the chunk again if the write fails.
    pub fn alloc_and_write(&self, bytes: &[u8]) -> Result<ChunkPtr> {
        let ptr = self.alloc(bytes.len() as u32)?;

        if let Err(err) = self.write(ptr, bytes) {
            let _ = self.free(ptr);
            return Err(err);
        }

        Ok(ptr)
    }

    /// Overwrite a chunk's payload from offset 0
    pub fn write(&self, ptr: ChunkPtr, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut meta = inner.get(ptr)?;

        if bytes.len() > meta.cap as usize {
            return Err(VaultError::InvalidArgument(format!(
                "chunk too small: {} bytes into capacity {}",
                bytes.len(),
                meta.cap
            )));
        }

        meta.size = bytes.len() as u32;
        inner.write_header(ptr, meta)?;
        // The header write leaves the stream at the payload start.
        inner.stream.write_all(bytes)?;
        inner.chunks.insert(ptr, meta);

        Ok(())
    }

    /// Write within a chunk at a payload offset
    ///
    /// Grows `size` only when the write extends past it.
    pub fn write_at(&self, ptr: ChunkPtr, bytes: &[u8], off: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut meta = inner.get(ptr)?;

        let end = off as usize + bytes.len();
        if end > meta.cap as usize {
            return Err(VaultError::InvalidArgument(format!(
                "chunk too small: write ends at {} into capacity {}",
                end, meta.cap
            )));
        }

        if end > meta.size as usize {
            meta.size = end as u32;
            inner.write_header(ptr, meta)?;
            inner.chunks.insert(ptr, meta);
        }

        inner.stream.seek(SeekFrom::Start(
            ptr as u64 + u64::from(CHUNK_HEADER_SIZE) + u64::from(off),
        ))?;
        inner.stream.write_all(bytes)?;

        Ok(())
    }

    /// Read a chunk's payload (`size` bytes)
    pub fn read(&self, ptr: ChunkPtr) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let meta = inner.get(ptr)?;

        let mut buf = vec![0u8; meta.size as usize];
        inner
            .stream
            .seek(SeekFrom::Start(ptr as u64 + u64::from(CHUNK_HEADER_SIZE)))?;
        inner.stream.read_exact(&mut buf)?;

        Ok(buf)
    }

    /// Flag a chunk for reuse; disk space is not reclaimed
    pub fn free(&self, ptr: ChunkPtr) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut meta = inner.get(ptr)?;

        meta.free = true;
        inner.write_header(ptr, meta)?;

        inner.chunks.insert(ptr, meta);
        inner.free_chunks.insert(ptr);

        Ok(())
    }

    /// Payload bytes in use at `ptr`
    pub fn size(&self, ptr: ChunkPtr) -> Result<u32> {
        Ok(self.inner.lock().get(ptr)?.size)
    }

    /// Payload capacity at `ptr`
    pub fn cap(&self, ptr: ChunkPtr) -> Result<u32> {
        Ok(self.inner.lock().get(ptr)?.cap)
    }

    /// Run `f` against the backing stream (stats plumbing)
    pub(crate) fn with_stream<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.lock().stream)
    }
}

impl<S: Read + Write + Seek> PoolInner<S> {
    fn get(&self, ptr: ChunkPtr) -> Result<ChunkMeta> {
        self.chunks
            .get(&ptr)
            .copied()
            .ok_or(VaultError::ChunkNotFound(ptr))
    }

    /// Rewrite a chunk's header, leaving the stream positioned at
    /// the payload start
    fn write_header(&mut self, ptr: ChunkPtr, meta: ChunkMeta) -> Result<()> {
        self.stream.seek(SeekFrom::Start(ptr as u64))?;
        self.stream.write_all(&meta.encode())?;

        Ok(())
    }
}
