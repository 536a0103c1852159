//! Physical memory: nodes, zones and page frames.

use std::sync::{Arc, PoisonError, RwLock};

use bitflags::bitflags;

use super::vfs::Inode;

bitflags! {
    /// Page frame state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PageFlags: u32 {
        /// Anonymous memory (heap, stack, shm swap-backed).
        const ANON      = 1 << 0;
        /// Page carries filesystem-private data (buffer heads).
        const PRIVATE   = 1 << 1;
        /// Page is on an LRU list.
        const LRU       = 1 << 2;
        const DIRTY     = 1 << 3;
        const WRITEBACK = 1 << 4;
        /// Reserved by firmware or the kernel image; never cache.
        const RESERVED  = 1 << 5;
    }
}

/// Address space a page belongs to. Anonymous or orphaned mappings have no host.
#[derive(Debug)]
pub struct Mapping {
    host: Option<Arc<Inode>>,
}

impl Mapping {
    pub fn new(host: Option<Arc<Inode>>) -> Self {
        Self { host }
    }

    /// Mapping owned by a file.
    pub fn of(inode: &Arc<Inode>) -> Arc<Self> {
        Arc::new(Self::new(Some(Arc::clone(inode))))
    }

    pub fn host(&self) -> Option<&Arc<Inode>> {
        self.host.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
struct FrameState {
    flags: PageFlags,
    mapping: Option<Arc<Mapping>>,
}

/// Point-in-time view of one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameView {
    pub flags: PageFlags,
    pub mapping: Option<Arc<Mapping>>,
}

/// One physical page frame.
///
/// State is read and replaced as a whole under a per-frame lock; nothing
/// stops a frame from being reassigned between two reads.
#[derive(Debug)]
pub struct Frame {
    pfn: u64,
    state: RwLock<FrameState>,
}

impl Frame {
    pub fn new(pfn: u64, flags: PageFlags, mapping: Option<Arc<Mapping>>) -> Self {
        Self {
            pfn,
            state: RwLock::new(FrameState { flags, mapping }),
        }
    }

    pub fn pfn(&self) -> u64 {
        self.pfn
    }

    pub fn view(&self) -> FrameView {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        FrameView {
            flags: state.flags,
            mapping: state.mapping.clone(),
        }
    }

    /// Hands the frame to a new owner (or frees it with `None`).
    pub fn reassign(&self, flags: PageFlags, mapping: Option<Arc<Mapping>>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.flags = flags;
        state.mapping = mapping;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Dma,
    Dma32,
    Normal,
    Movable,
}

impl ZoneKind {
    pub fn name(&self) -> &'static str {
        match self {
            ZoneKind::Dma => "DMA",
            ZoneKind::Dma32 => "DMA32",
            ZoneKind::Normal => "Normal",
            ZoneKind::Movable => "Movable",
        }
    }
}

/// Contiguous run of frames starting at `start_pfn`.
#[derive(Debug)]
pub struct Zone {
    kind: ZoneKind,
    start_pfn: u64,
    frames: Vec<Frame>,
}

impl Zone {
    pub fn new(kind: ZoneKind, start_pfn: u64) -> Self {
        Self {
            kind,
            start_pfn,
            frames: Vec::new(),
        }
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    pub fn start_pfn(&self) -> u64 {
        self.start_pfn
    }

    pub fn end_pfn(&self) -> u64 {
        self.start_pfn + self.frames.len() as u64
    }

    /// Appends a frame at the next pfn and returns it.
    pub fn push(&mut self, flags: PageFlags, mapping: Option<Arc<Mapping>>) -> &Frame {
        let pfn = self.end_pfn();
        self.frames.push(Frame::new(pfn, flags, mapping));
        &self.frames[self.frames.len() - 1]
    }

    /// Frames in increasing pfn order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

/// NUMA memory node.
#[derive(Debug)]
pub struct MemoryNode {
    id: u32,
    online: bool,
    zones: Vec<Zone>,
}

impl MemoryNode {
    pub fn new(id: u32, online: bool) -> Self {
        Self {
            id,
            online,
            zones: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut Vec<Zone> {
        &mut self.zones
    }

    pub fn spanned_pages(&self) -> u64 {
        self.zones.iter().map(|z| z.frames.len() as u64).sum()
    }
}

/// All memory nodes of a machine.
#[derive(Debug, Default)]
pub struct PhysicalMemory {
    nodes: Vec<MemoryNode>,
}

impl PhysicalMemory {
    pub fn new(nodes: Vec<MemoryNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[MemoryNode] {
        &self.nodes
    }

    pub fn online_nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.iter().filter(|n| n.online)
    }

    pub fn total_frames(&self) -> u64 {
        self.nodes.iter().map(MemoryNode::spanned_pages).sum()
    }
}
