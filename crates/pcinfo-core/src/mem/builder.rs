//! Incremental construction of [`MemoryImage`]s.
//!
//! Used by the live collector and by test fixtures.

use std::path::PathBuf;
use std::sync::Arc;

use super::MemoryImage;
use super::epoch::ReadEpoch;
use super::frame::{Mapping, MemoryNode, PageFlags, PhysicalMemory, Zone, ZoneKind};
use super::vfs::{DeviceId, FsRegistry, FsType, Inode, SuperBlock};

pub struct ImageBuilder {
    page_size: u64,
    registry: FsRegistry,
    nodes: Vec<MemoryNode>,
    next_pfn: u64,
}

impl ImageBuilder {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            registry: FsRegistry::new(ReadEpoch::new()),
            nodes: Vec::new(),
            next_pfn: 0,
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn epoch(&self) -> &Arc<ReadEpoch> {
        self.registry.epoch()
    }

    /// Starts a new memory node with one `Normal` zone. Following frames land there.
    pub fn node(&mut self, id: u32, online: bool) -> &mut Self {
        let mut node = MemoryNode::new(id, online);
        node.zones_mut().push(Zone::new(ZoneKind::Normal, self.next_pfn));
        self.nodes.push(node);
        self
    }

    /// Starts a new zone on the current node.
    pub fn zone(&mut self, kind: ZoneKind) -> &mut Self {
        let start = self.next_pfn;
        self.current_node().zones_mut().push(Zone::new(kind, start));
        self
    }

    pub fn register_fs_type(&mut self, name: &str, requires_dev: bool) -> Arc<FsType> {
        self.registry.register(name, requires_dev)
    }

    pub fn mount(&mut self, fs_type: &str, device: DeviceId, mount_point: impl Into<PathBuf>) -> Arc<SuperBlock> {
        self.registry.mount(fs_type, device, mount_point)
    }

    /// Pushes one frame with explicit state.
    pub fn frame(&mut self, flags: PageFlags, mapping: Option<Arc<Mapping>>) -> &mut Self {
        self.current_zone().push(flags, mapping);
        self.next_pfn += 1;
        self
    }

    /// Pushes `count` page-cache frames owned by `inode` and bumps its page count.
    pub fn file_frames(&mut self, inode: &Arc<Inode>, count: u64) -> &mut Self {
        let mapping = Mapping::of(inode);
        for _ in 0..count {
            self.frame(PageFlags::PRIVATE | PageFlags::LRU, Some(Arc::clone(&mapping)));
        }
        inode.add_nrpages(count);
        self
    }

    pub fn anon_frames(&mut self, count: u64) -> &mut Self {
        for _ in 0..count {
            self.frame(PageFlags::ANON | PageFlags::LRU, None);
        }
        self
    }

    /// Pushes unused frames.
    pub fn free_frames(&mut self, count: u64) -> &mut Self {
        for _ in 0..count {
            self.frame(PageFlags::empty(), None);
        }
        self
    }

    pub fn build(self) -> MemoryImage {
        MemoryImage::new(self.page_size, PhysicalMemory::new(self.nodes), self.registry)
    }

    fn current_node(&mut self) -> &mut MemoryNode {
        if self.nodes.is_empty() {
            self.node(0, true);
        }
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    fn current_zone(&mut self) -> &mut Zone {
        let start = self.next_pfn;
        let zones = self.current_node().zones_mut();
        if zones.is_empty() {
            zones.push(Zone::new(ZoneKind::Normal, start));
        }
        let last = zones.len() - 1;
        &mut zones[last]
    }
}
