//! Cache-residency aggregation engine.
//!
//! Two strategies over a [`MemoryImage`](crate::mem::MemoryImage):
//!
//! ```text
//!   FullScan                          EvictionWalker
//!   nodes → zones → frames            allow-list → fs type → superblocks
//!        │                                   │
//!   FrameResolver (frame → file)       dentry LRU │ inode LRU │ all inodes
//!        │                                   │
//!   CacheIndex (dedup by identity)     WalkEvent stream (no dedup)
//! ```

pub mod index;
pub mod resolver;
pub mod scan;
pub mod walker;

pub use index::{CacheIndex, CacheRecord, RecordArena, ScanError};
pub use resolver::{Accounting, FrameResolver, Resolved};
pub use scan::{FullScan, ScanStats};
pub use walker::{EvictionWalker, FileSummary, SUPPORTED_FILESYSTEMS, Walk, WalkEvent, WalkMode, percent};
