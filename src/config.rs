//! Configuration for VaultKV
//!
//! Centralized options with sensible defaults.

use crate::block::{DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::error::{Result, VaultError};

/// Options controlling the on-disk layout of a new store
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Size of each block in bytes, including the block header
    pub block_size: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Options {
    /// Create options with the default block size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size for newly created files
    ///
    /// Existing files keep the block size they were created with.
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Validate the options before creating a file
    pub(crate) fn validate(&self) -> Result<()> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(VaultError::InvalidArgument(format!(
                "invalid block size {} (should be greater or equal to {})",
                self.block_size, MIN_BLOCK_SIZE
            )));
        }

        Ok(())
    }
}
