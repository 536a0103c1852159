//! Full physical-memory scan.

use std::time::{Duration, Instant};

use tracing::debug;

use super::index::{CacheIndex, RecordArena, ScanError};
use super::resolver::{Accounting, FrameResolver};
use crate::mem::PhysicalMemory;

/// Counters from the last scan, for logging.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub nodes: usize,
    pub frames: u64,
    pub file_frames: u64,
    pub elapsed: Duration,
}

/// Walks every frame of every online node and builds a fresh [`CacheIndex`].
pub struct FullScan<'a> {
    memory: &'a PhysicalMemory,
    resolver: FrameResolver,
    arena_capacity: Option<usize>,
}

impl<'a> FullScan<'a> {
    pub fn new(memory: &'a PhysicalMemory, page_size: u64, accounting: Accounting) -> Self {
        Self {
            memory,
            resolver: FrameResolver::new(page_size, accounting),
            arena_capacity: None,
        }
    }

    /// Caps the number of distinct files one scan may record.
    pub fn with_arena_capacity(mut self, capacity: Option<usize>) -> Self {
        self.arena_capacity = capacity;
        self
    }

    pub fn scan(&self) -> Result<CacheIndex, ScanError> {
        self.scan_with_stats().map(|(index, _)| index)
    }

    /// Scans in increasing pfn order within each zone. Fails as a whole on
    /// the first allocation failure; the partial index is dropped.
    pub fn scan_with_stats(&self) -> Result<(CacheIndex, ScanStats), ScanError> {
        let start = Instant::now();
        let arena = match self.arena_capacity {
            Some(capacity) => RecordArena::bounded(capacity),
            None => RecordArena::unbounded(),
        };
        let mut index = CacheIndex::with_arena(arena);
        let mut stats = ScanStats::default();

        for node in self.memory.online_nodes() {
            stats.nodes += 1;
            for zone in node.zones() {
                for frame in zone.frames() {
                    stats.frames += 1;
                    let Some(resolved) = self.resolver.resolve(frame) else {
                        continue;
                    };
                    stats.file_frames += 1;
                    if let Err(e) = index.upsert(resolved.identity, resolved.bytes) {
                        debug!(pfn = frame.pfn(), files = index.len(), "full scan aborted: {}", e);
                        return Err(e);
                    }
                }
            }
        }

        stats.elapsed = start.elapsed();
        debug!(
            nodes = stats.nodes,
            frames = stats.frames,
            file_frames = stats.file_frames,
            files = index.len(),
            accounting = self.resolver.accounting().name(),
            "full scan finished in {:?}",
            stats.elapsed
        );
        Ok((index, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{DeviceId, FileIdentity, ImageBuilder, MemoryImage, PageFlags};

    const PAGE: u64 = 4096;

    fn two_file_image() -> MemoryImage {
        let mut b = ImageBuilder::new(PAGE);
        let sb = b.mount("ext4", DeviceId::new(8, 1), "/");
        let a = sb.new_inode(100, 2 * PAGE);
        let c = sb.new_inode(200, 10 * PAGE);
        // file 100 has two frames far apart, file 200 has one
        b.file_frames(&a, 1).anon_frames(3).file_frames(&c, 1).free_frames(2);
        b.node(1, true).file_frames(&a, 1);
        b.build()
    }

    fn ident(ino: u64) -> FileIdentity {
        FileIdentity::new(DeviceId::new(8, 1), ino)
    }

    #[test]
    fn test_empty_memory_scans_to_empty_index() {
        let image = ImageBuilder::new(PAGE).build();
        let index = FullScan::new(image.memory(), PAGE, Accounting::PerFrame).scan().unwrap();
        assert!(index.is_empty());

        let mut b = ImageBuilder::new(PAGE);
        b.anon_frames(4).free_frames(4);
        let image = b.build();
        let (index, stats) = FullScan::new(image.memory(), PAGE, Accounting::PerFrame)
            .scan_with_stats()
            .unwrap();
        assert!(index.is_empty());
        assert_eq!(stats.frames, 8);
        assert_eq!(stats.file_frames, 0);
    }

    #[test]
    fn test_two_frames_fold_into_one_record_per_frame() {
        let image = two_file_image();
        let index = FullScan::new(image.memory(), PAGE, Accounting::PerFrame).scan().unwrap();

        let records: Vec<_> = index.drain().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity, ident(100));
        assert_eq!(records[0].cached_bytes, 2 * PAGE);
        assert_eq!(records[1].identity, ident(200));
        assert_eq!(records[1].cached_bytes, PAGE);
    }

    #[test]
    fn test_two_frames_fold_into_one_record_file_level() {
        let image = two_file_image();
        let index = FullScan::new(image.memory(), PAGE, Accounting::FileLevel).scan().unwrap();

        // each of the two frames contributes the whole file (2 pages)
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&ident(100)).unwrap().cached_bytes, 4 * PAGE);
        assert_eq!(index.get(&ident(200)).unwrap().cached_bytes, PAGE);
    }

    #[test]
    fn test_offline_nodes_are_not_scanned() {
        let mut b = ImageBuilder::new(PAGE);
        let sb = b.mount("ext4", DeviceId::new(8, 1), "/");
        let inode = sb.new_inode(1, PAGE);
        b.node(0, false).file_frames(&inode, 1);
        let image = b.build();

        let (index, stats) = FullScan::new(image.memory(), PAGE, Accounting::PerFrame)
            .scan_with_stats()
            .unwrap();
        assert!(index.is_empty());
        assert_eq!(stats.nodes, 0);
    }

    #[test]
    fn test_rescan_of_unchanged_system_is_identical() {
        let image = two_file_image();
        for accounting in [Accounting::PerFrame, Accounting::FileLevel] {
            let scan = FullScan::new(image.memory(), PAGE, accounting);
            let first: Vec<_> = scan.scan().unwrap().drain().collect();
            let second: Vec<_> = scan.scan().unwrap().drain().collect();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_arena_exhaustion_fails_whole_scan() {
        let image = two_file_image();
        let err = FullScan::new(image.memory(), PAGE, Accounting::PerFrame)
            .with_arena_capacity(Some(1))
            .scan()
            .unwrap_err();
        assert_eq!(err, ScanError::OutOfResources { capacity: Some(1) });
    }

    #[test]
    fn test_reassigned_frame_is_observed_as_new_owner() {
        let mut b = ImageBuilder::new(PAGE);
        let sb = b.mount("ext4", DeviceId::new(8, 1), "/");
        let inode = sb.new_inode(7, PAGE);
        b.file_frames(&inode, 1);
        let image = b.build();

        let frame = &image.memory().nodes()[0].zones()[0].frames()[0];
        frame.reassign(PageFlags::ANON, None);
        let index = FullScan::new(image.memory(), PAGE, Accounting::PerFrame).scan().unwrap();
        assert!(index.is_empty());
    }
}
