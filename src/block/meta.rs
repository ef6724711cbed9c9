//! Per-block header
//!
//! Every block starts with two little-endian u32 fields: `end`, the
//! number of payload bytes in use, and `next`, the index of the
//! successor block in the chain (0 terminates).

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// In-memory descriptor of one block: its file position and index
/// plus the persisted `end`/`next` fields
#[derive(Debug, Clone, Copy)]
pub struct BlockMeta {
    pub(crate) pos: u64,
    pub(crate) idx: u32,

    /// Payload bytes used, relative to the start of the payload
    pub(crate) end: u32,
    /// Successor block index, 0 = terminator
    pub(crate) next: u32,
}

impl BlockMeta {
    /// Block index within the file
    pub fn idx(&self) -> u32 {
        self.idx
    }

    /// Payload bytes in use
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Successor block index (0 = none)
    pub fn next(&self) -> u32 {
        self.next
    }

    /// Read the header of the block at `pos`
    pub(crate) fn load<F: Read + Seek>(f: &mut F, pos: u64, idx: u32) -> Result<Self> {
        f.seek(SeekFrom::Start(pos))?;

        let mut buf = [0u8; 8];
        f.read_exact(&mut buf)?;

        Ok(Self {
            pos,
            idx,
            end: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            next: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        })
    }

    /// Write both header fields at the block's position
    pub(crate) fn store<F: Write + Seek>(&self, f: &mut F) -> Result<()> {
        f.seek(SeekFrom::Start(self.pos))?;
        f.write_all(&self.end.to_le_bytes())?;
        f.write_all(&self.next.to_le_bytes())?;

        Ok(())
    }

    /// Rewrite only the `end` field
    pub(crate) fn write_end<F: Write + Seek>(&self, f: &mut F) -> Result<()> {
        f.seek(SeekFrom::Start(self.pos))?;
        f.write_all(&self.end.to_le_bytes())?;

        Ok(())
    }

    /// Rewrite only the `next` field
    pub(crate) fn write_next<F: Write + Seek>(&self, f: &mut F) -> Result<()> {
        f.seek(SeekFrom::Start(self.pos + 4))?;
        f.write_all(&self.next.to_le_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn store_and_load() {
        let mut buf = Cursor::new(vec![0u8; 64]);

        let meta = BlockMeta {
            pos: 16,
            idx: 2,
            end: 120,
            next: 5,
        };
        meta.store(&mut buf).unwrap();

        let got = BlockMeta::load(&mut buf, 16, 2).unwrap();
        assert_eq!(got.end, 120);
        assert_eq!(got.next, 5);
    }

    #[test]
    fn partial_field_writes() {
        let mut buf = Cursor::new(vec![0u8; 64]);

        let mut meta = BlockMeta {
            pos: 8,
            idx: 1,
            end: 3,
            next: 4,
        };
        meta.store(&mut buf).unwrap();

        meta.end = 99;
        meta.write_end(&mut buf).unwrap();
        meta.next = 0;
        meta.write_next(&mut buf).unwrap();

        let got = BlockMeta::load(&mut buf, 8, 1).unwrap();
        assert_eq!(got.end, 99);
        assert_eq!(got.next, 0);
    }
}
