//! Eviction-list walker.
//!
//! Instead of scanning every frame, walks the per-superblock object lists of
//! allow-listed filesystem types and reports each object's residency as it
//! goes. Nothing is deduplicated: a file listed twice is reported twice.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::mem::{DeviceId, FileIdentity, FsRegistry, Inode, LruStatus, ReadEpoch, SuperBlock};

/// Filesystem types the walker supports.
pub const SUPPORTED_FILESYSTEMS: &[&str] = &["ext4"];

/// Trailing path components rendered for a dentry.
const DENTRY_PATH_DEPTH: usize = 4;

/// Which per-superblock list to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WalkMode {
    /// Unused dentries on the dentry LRU.
    Dentries,
    /// Unused inodes on the inode LRU.
    InodeLru,
    /// Every live inode, reclaimable or not.
    AllInodes,
}

/// Residency of one object at the moment it was visited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub identity: FileIdentity,
    /// Dentry path, only set in [`WalkMode::Dentries`].
    pub name: Option<String>,
    pub resident_bytes: u64,
    pub total_bytes: u64,
}

impl FileSummary {
    fn from_inode(inode: &Inode, page_size: u64, name: Option<String>) -> Self {
        Self {
            identity: inode.identity(),
            name,
            resident_bytes: inode.nrpages().saturating_mul(page_size),
            total_bytes: inode.size(),
        }
    }

    /// `floor(resident * 100 / total)`, 0 for empty files.
    pub fn percent_resident(&self) -> u64 {
        percent(self.resident_bytes, self.total_bytes)
    }
}

pub fn percent(resident: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (u128::from(resident) * 100 / u128::from(total)) as u64
}

/// Items produced by a walk, in output order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WalkEvent {
    /// Start of an allow-listed filesystem type; emitted even if not registered.
    Filesystem(String),
    /// Start of one mounted instance.
    Device { device: DeviceId, mount_point: String },
    Object(FileSummary),
}

pub struct EvictionWalker<'a> {
    registry: &'a FsRegistry,
    page_size: u64,
}

impl<'a> EvictionWalker<'a> {
    pub fn new(registry: &'a FsRegistry, page_size: u64) -> Self {
        Self {
            registry,
            page_size,
        }
    }

    /// Starts a fresh walk. No state is carried over between calls.
    pub fn walk<S: AsRef<str>>(&self, allow_list: &'a [S], mode: WalkMode) -> Walk<'a, S> {
        Walk {
            registry: self.registry,
            page_size: self.page_size,
            mode,
            allow_list: allow_list.iter(),
            supers: VecDeque::new(),
            ready: VecDeque::new(),
        }
    }
}

/// Lazy walk. Each superblock's list is traversed inside its own read
/// section when the iterator reaches it; events are handed out after the
/// section ends.
pub struct Walk<'a, S> {
    registry: &'a FsRegistry,
    page_size: u64,
    mode: WalkMode,
    allow_list: std::slice::Iter<'a, S>,
    supers: VecDeque<Arc<SuperBlock>>,
    ready: VecDeque<WalkEvent>,
}

impl<S: AsRef<str>> Walk<'_, S> {
    fn traverse(&mut self, sb: &SuperBlock) {
        self.ready.push_back(WalkEvent::Device {
            device: sb.device(),
            mount_point: sb.mount_point().display().to_string(),
        });

        let registry = self.registry;
        let epoch: &Arc<ReadEpoch> = registry.epoch();
        let page_size = self.page_size;
        let mode = self.mode;
        let ready = &mut self.ready;
        let guard = epoch.enter();
        let walked = match mode {
            WalkMode::Dentries => sb.dentry_lru().walk(&guard, usize::MAX, |dentry| {
                if let Some(inode) = dentry.inode() {
                    let name = dentry.path(DENTRY_PATH_DEPTH);
                    ready.push_back(WalkEvent::Object(FileSummary::from_inode(inode, page_size, Some(name))));
                } else {
                    trace!(name = dentry.name(), "negative dentry skipped");
                }
                LruStatus::Skip
            }),
            WalkMode::InodeLru => sb.inode_lru().walk(&guard, usize::MAX, |inode| {
                ready.push_back(WalkEvent::Object(FileSummary::from_inode(inode, page_size, None)));
                LruStatus::Skip
            }),
            WalkMode::AllInodes => sb.inodes().walk(&guard, usize::MAX, |inode| {
                ready.push_back(WalkEvent::Object(FileSummary::from_inode(inode, page_size, None)));
                LruStatus::Skip
            }),
        };
        drop(guard);
        debug!(device = %sb.device(), mode = ?mode, walked, "list walked");
    }
}

impl<S: AsRef<str>> Iterator for Walk<'_, S> {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }
            if let Some(sb) = self.supers.pop_front() {
                self.traverse(&sb);
                continue;
            }
            let name = self.allow_list.next()?.as_ref();
            match self.registry.get_fs_type(name) {
                Some(ty) => self.supers.extend(ty.supers()),
                None => debug!(fs = name, "filesystem type not registered"),
            }
            return Some(WalkEvent::Filesystem(name.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{Dentry, ImageBuilder, MemoryImage};

    const PAGE: u64 = 4096;

    fn objects(events: &[WalkEvent]) -> Vec<&FileSummary> {
        events
            .iter()
            .filter_map(|e| match e {
                WalkEvent::Object(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn ext4_image() -> MemoryImage {
        let mut b = ImageBuilder::new(PAGE);
        let sb = b.mount("ext4", DeviceId::new(8, 1), "/");
        let root = Arc::new(Dentry::new("/", None, None));

        let half = sb.new_inode(12, 1024 * 1024);
        half.set_nrpages(128); // 512 KiB
        let empty = sb.new_inode(13, 0);
        let busy = sb.new_inode(14, 8 * PAGE);
        busy.set_nrpages(8);

        sb.inode_lru().add(Arc::clone(&half));
        sb.inode_lru().add(Arc::clone(&empty));
        sb.dentry_lru()
            .add(Arc::new(Dentry::new("data.bin", Some(Arc::clone(&root)), Some(Arc::clone(&half)))));
        sb.dentry_lru()
            .add(Arc::new(Dentry::new("gone.txt", Some(Arc::clone(&root)), None)));

        b.mount("xfs", DeviceId::new(8, 2), "/srv").new_inode(99, PAGE).set_nrpages(1);
        b.build()
    }

    #[test]
    fn test_percent_resident() {
        assert_eq!(percent(512 * 1024, 1024 * 1024), 50);
        assert_eq!(percent(512 * 1024, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_inode_lru_walk() {
        let image = ext4_image();
        let walker = EvictionWalker::new(image.registry(), PAGE);
        let events: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::InodeLru).collect();

        assert_eq!(events[0], WalkEvent::Filesystem("ext4".to_string()));
        assert!(matches!(events[1], WalkEvent::Device { device, .. } if device == DeviceId::new(8, 1)));

        let objs = objects(&events);
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0].identity.ino, 12);
        assert_eq!(objs[0].resident_bytes, 512 * 1024);
        assert_eq!(objs[0].percent_resident(), 50);
        assert_eq!(objs[1].total_bytes, 0);
        assert_eq!(objs[1].percent_resident(), 0);
    }

    #[test]
    fn test_all_inodes_walk_covers_busy_inodes() {
        let image = ext4_image();
        let walker = EvictionWalker::new(image.registry(), PAGE);
        let events: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::AllInodes).collect();
        let inos: Vec<u64> = objects(&events).iter().map(|s| s.identity.ino).collect();
        assert_eq!(inos, vec![12, 13, 14]);
    }

    #[test]
    fn test_dentry_walk_skips_negative_entries() {
        let image = ext4_image();
        let walker = EvictionWalker::new(image.registry(), PAGE);
        let events: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::Dentries).collect();
        let objs = objects(&events);
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].name.as_deref(), Some("/data.bin"));
    }

    #[test]
    fn test_allow_list_excludes_other_filesystems() {
        let mut b = ImageBuilder::new(PAGE);
        let sb = b.mount("xfs", DeviceId::new(8, 2), "/srv");
        let inode = sb.new_inode(5, PAGE);
        sb.inode_lru().add(inode);
        let image = b.build();

        let walker = EvictionWalker::new(image.registry(), PAGE);
        let events: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::InodeLru).collect();
        assert_eq!(events, vec![WalkEvent::Filesystem("ext4".to_string())]);
    }

    #[test]
    fn test_walk_is_restartable_and_read_only() {
        let image = ext4_image();
        let walker = EvictionWalker::new(image.registry(), PAGE);
        let first: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::InodeLru).collect();
        let second: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::InodeLru).collect();
        assert_eq!(first, second);
        let sb = &image.registry().get_fs_type("ext4").unwrap().supers()[0];
        assert_eq!(sb.inode_lru().len(), 2);
        assert_eq!(image.epoch().readers(), 0);
    }

    #[test]
    fn test_walk_is_lazy_per_superblock() {
        let mut b = ImageBuilder::new(PAGE);
        let first = b.mount("ext4", DeviceId::new(8, 1), "/");
        let second = b.mount("ext4", DeviceId::new(8, 3), "/home");
        first.inode_lru().add(first.new_inode(1, PAGE));
        let late = second.new_inode(2, PAGE);
        let image = b.build();

        let walker = EvictionWalker::new(image.registry(), PAGE);
        let allow = ["ext4"];
        let mut walk = walker.walk(&allow[..], WalkMode::InodeLru);
        assert!(matches!(walk.next(), Some(WalkEvent::Filesystem(_))));
        assert!(matches!(walk.next(), Some(WalkEvent::Device { .. })));
        assert!(matches!(walk.next(), Some(WalkEvent::Object(_))));

        // second instance is only walked when reached
        second.inode_lru().add(late);
        let rest: Vec<_> = walk.collect();
        assert_eq!(rest.len(), 2);
        assert!(matches!(&rest[1], WalkEvent::Object(s) if s.identity.ino == 2));
    }

    #[test]
    fn test_removal_during_walk_is_deferred() {
        let mut b = ImageBuilder::new(PAGE);
        let sb = b.mount("ext4", DeviceId::new(8, 1), "/");
        let keep = sb.new_inode(1, PAGE);
        let evict = sb.new_inode(2, PAGE);
        sb.inode_lru().add(Arc::clone(&keep));
        sb.inode_lru().add(Arc::clone(&evict));
        let image = b.build();
        let walker = EvictionWalker::new(image.registry(), PAGE);

        let reader = image.epoch().enter();
        sb.inode_lru().remove(&evict);
        let during: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::InodeLru).collect();
        assert_eq!(objects(&during).len(), 2);
        assert_eq!(image.epoch().pending(), 1);
        drop(reader);

        let after: Vec<_> = walker.walk(SUPPORTED_FILESYSTEMS, WalkMode::InodeLru).collect();
        let inos: Vec<u64> = objects(&after).iter().map(|s| s.identity.ino).collect();
        assert_eq!(inos, vec![1]);
    }
}
