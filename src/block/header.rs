//! DB header
//!
//! The fixed header at the start of every block file, with partial
//! rewrite helpers for the two mutable fields.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Result, VaultError};

use super::{LATEST_VERSION, MAGIC, MIN_BLOCK_SIZE};

/// On-disk DB header, five little-endian u32 fields
#[derive(Debug, Clone, Copy)]
pub struct DbHeader {
    pub magic: u32,
    pub version: u32,

    pub block_size: u32,
    pub block_count: u32,

    pub first_free_block: u32,
}

/// Byte offset of the `block_count` field within the header
const BLOCK_COUNT_OFFSET: u64 = 12;

/// Byte offset of the `first_free_block` field within the header
const FIRST_FREE_BLOCK_OFFSET: u64 = 16;

impl DbHeader {
    /// Header for a freshly created file
    pub(crate) fn new(block_size: u32) -> Self {
        Self {
            magic: MAGIC,
            version: LATEST_VERSION,
            block_size,
            block_count: 0,
            first_free_block: 0,
        }
    }

    /// Write the full header at the current stream position
    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.magic.to_le_bytes())?;
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.block_size.to_le_bytes())?;
        w.write_all(&self.block_count.to_le_bytes())?;
        w.write_all(&self.first_free_block.to_le_bytes())?;

        Ok(())
    }

    /// Read and validate a header from the current stream position
    pub(crate) fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; 20];
        r.read_exact(&mut buf)?;

        let header = Self {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            version: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            block_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            block_count: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            first_free_block: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        };

        if header.magic != MAGIC {
            return Err(VaultError::Corruption(format!(
                "magic doesn't match: expected {:#x}, found {:#x}",
                MAGIC, header.magic
            )));
        }
        if header.version == 0 || header.version > LATEST_VERSION {
            return Err(VaultError::Corruption(format!(
                "unsupported version {}, latest supported version is {}",
                header.version, LATEST_VERSION
            )));
        }
        if header.block_size < MIN_BLOCK_SIZE {
            return Err(VaultError::Corruption(format!(
                "invalid block size {} (should be greater or equal to {})",
                header.block_size, MIN_BLOCK_SIZE
            )));
        }

        Ok(header)
    }

    /// Rewrite only the `block_count` field
    pub(crate) fn write_block_count<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.seek(SeekFrom::Start(BLOCK_COUNT_OFFSET))?;
        w.write_all(&self.block_count.to_le_bytes())?;

        Ok(())
    }

    /// Rewrite only the `first_free_block` field
    pub(crate) fn write_first_free_block<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.seek(SeekFrom::Start(FIRST_FREE_BLOCK_OFFSET))?;
        w.write_all(&self.first_free_block.to_le_bytes())?;

        Ok(())
    }
}
