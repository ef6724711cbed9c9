//! Block Layer
//!
//! A paged allocator over a random-access byte stream.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ DB Header (20 bytes)                                    │
//! │   Magic u32 | Version u32 | BlockSize u32               │
//! │   BlockCount u32 | FirstFreeBlock u32                   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Block 0 (BlockSize bytes)                               │
//! │   End u32 | Next u32 | payload...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Block 1                                                 │
//! │   ... repeated for each block ...                       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Block 0 is reserved for the index object, a chunk pool holding
//! the JSON metadata of every named object. Free blocks form a
//! singly-linked chain starting at `FirstFreeBlock`; block index 0
//! doubles as the chain terminator.

mod db;
mod file;
mod header;
mod meta;
mod object;

pub use db::{BlockDb, ObjectMeta, Stats};
pub use header::DbHeader;
pub use meta::BlockMeta;
pub use object::{Object, ObjectStats};

pub(crate) use file::{BlockFile, FileState};

// =============================================================================
// Shared Constants (used by header, file, db, object)
// =============================================================================

/// Magic number identifying a VaultKV block file
pub const MAGIC: u32 = 1_978_942_581;

/// Latest supported file format version
pub const LATEST_VERSION: u32 = 1;

/// Default block size for newly created files
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// DB header size: 5 fields of u32 = 20 bytes
pub const DB_HEADER_SIZE: u32 = 20;

/// Block header size: End (4) + Next (4) = 8 bytes
pub const BLOCK_META_SIZE: u32 = 8;

/// Smallest usable block size: a block header plus one payload byte
pub const MIN_BLOCK_SIZE: u32 = BLOCK_META_SIZE + 1;
