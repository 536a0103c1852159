//! Model of the kernel structures the scanners read.
//!
//! A [`MemoryImage`] bundles physical memory (nodes → zones → frames), the
//! filesystem registry (types → superblocks → object lists) and the read
//! epoch that protects list traversals. Images are either assembled from the
//! running system by the collector or built by hand for tests.

pub mod builder;
pub mod epoch;
pub mod frame;
pub mod lru;
pub mod vfs;

use std::sync::Arc;

pub use builder::ImageBuilder;
pub use epoch::{EpochGuard, ReadEpoch};
pub use frame::{Frame, FrameView, Mapping, MemoryNode, PageFlags, PhysicalMemory, Zone, ZoneKind};
pub use lru::{ListLru, LruStatus};
pub use vfs::{Dentry, DeviceId, FileIdentity, FsRegistry, FsType, Inode, SuperBlock};

/// Default frame size on the platforms we care about.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

#[derive(Debug)]
pub struct MemoryImage {
    page_size: u64,
    memory: PhysicalMemory,
    registry: FsRegistry,
}

impl MemoryImage {
    pub fn new(page_size: u64, memory: PhysicalMemory, registry: FsRegistry) -> Self {
        Self {
            page_size,
            memory,
            registry,
        }
    }

    pub fn builder(page_size: u64) -> ImageBuilder {
        ImageBuilder::new(page_size)
    }

    /// Size of one frame in bytes.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn registry(&self) -> &FsRegistry {
        &self.registry
    }

    pub fn epoch(&self) -> &Arc<ReadEpoch> {
        self.registry.epoch()
    }
}
