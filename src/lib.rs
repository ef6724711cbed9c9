//! # VaultKV
//!
//! A single-file embedded key-value store with:
//! - Named buckets of string-keyed JSON values
//! - Read/write transactions with commit-time application
//! - A paged block layer with free-list reuse
//! - On-disk dynamically-splitting hash maps
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Store Facade                             │
//! │          (buckets, transactions, JSON values)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      DiskMap                                 │
//! │        (hash trie: bucket arrays + KV node lists)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     ChunkPool                                │
//! │          (variable-length slab allocator)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Block DB / Objects                          │
//! │    (fixed-size blocks, free list, block-chain streams)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod block;
pub mod pool;
pub mod map;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, VaultError};
pub use config::Options;
pub use block::{BlockDb, Object};
pub use map::DiskMap;
pub use pool::{ChunkPool, ChunkPtr};
pub use store::{ReadTx, Store, WriteTx};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of VaultKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
