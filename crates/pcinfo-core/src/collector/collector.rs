//! Live collector that assembles a [`MemoryImage`] of the running host.
//!
//! Block-backed mounts from `mountinfo` become superblocks. Each one is walked
//! from its mount point without crossing into other devices; every entry
//! becomes a dentry, every distinct inode number an inode, and resident pages
//! reported by the probe become file-backed frames.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::collector::procfs::{MountEntry, ParseError, parse_filesystems, parse_mountinfo};
use crate::collector::traits::{FileKind, FileSystem, ResidencyProbe};
use crate::mem::{Dentry, DeviceId, ImageBuilder, Inode, MemoryImage, SuperBlock};

/// Errors that can occur during collection.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a `/proc` input.
    Io(std::io::Error),
    /// Parse error in a `/proc` input.
    Parse(String),
    /// The probe cannot report residency on this platform.
    Unsupported(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
            CollectError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

/// Counters for one collection pass.
#[derive(Debug, Clone, Default)]
pub struct CollectStats {
    /// Superblocks whose tree was walked.
    pub mounts: usize,
    /// Directory entries examined.
    pub entries: usize,
    /// Entries skipped because they could not be read.
    pub skipped: usize,
    /// Resident pages turned into frames.
    pub resident_pages: u64,
    pub elapsed: Duration,
}

/// Builds memory images from `/proc` and a residency probe.
pub struct ImageCollector<F: FileSystem, P: ResidencyProbe> {
    fs: F,
    probe: P,
    proc_path: String,
    max_files_per_mount: usize,
}

impl<F: FileSystem, P: ResidencyProbe> ImageCollector<F, P> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `probe` - Residency probe (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, probe: P, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            probe,
            proc_path: proc_path.into(),
            max_files_per_mount: usize::MAX,
        }
    }

    /// Caps the number of entries examined per mounted filesystem.
    pub fn with_max_files_per_mount(mut self, max_files: usize) -> Self {
        self.max_files_per_mount = max_files;
        self
    }

    pub fn collect(&self) -> Result<MemoryImage, CollectError> {
        self.collect_with_stats().map(|(image, _)| image)
    }

    /// Collects a fresh image of the host.
    pub fn collect_with_stats(&self) -> Result<(MemoryImage, CollectStats), CollectError> {
        let started = Instant::now();
        let mut stats = CollectStats::default();

        let types = parse_filesystems(&self.read_proc("filesystems")?)?;
        let mounts = parse_mountinfo(&self.read_proc("self/mountinfo")?)?;

        let mut builder = ImageBuilder::new(self.probe.page_size());
        let mut block_backed = HashSet::new();
        for entry in &types {
            builder.register_fs_type(&entry.name, entry.requires_dev);
            if entry.requires_dev {
                block_backed.insert(entry.name.as_str());
            }
        }

        for mount in select_mounts(&mounts, &block_backed) {
            debug!(
                mount_id = mount.mount_id,
                parent_id = mount.parent_id,
                mount_point = %mount.mount_point,
                source = %mount.source,
                "walking mount"
            );
            let sb = builder.mount(&mount.fs_type, mount.device, &mount.mount_point);
            self.walk_mount(&mut builder, &sb, mount, &mut stats)?;
            stats.mounts += 1;
        }

        stats.elapsed = started.elapsed();
        debug!(
            mounts = stats.mounts,
            entries = stats.entries,
            skipped = stats.skipped,
            resident_pages = stats.resident_pages,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "host image collected"
        );
        Ok((builder.build(), stats))
    }

    fn read_proc(&self, name: &str) -> Result<String, CollectError> {
        let path = format!("{}/{}", self.proc_path, name);
        self.fs.read_to_string(Path::new(&path)).map_err(|e| {
            warn!(path = %path, error = %e, "cannot read proc file");
            CollectError::Io(e)
        })
    }

    fn walk_mount(
        &self,
        builder: &mut ImageBuilder,
        sb: &Arc<SuperBlock>,
        mount: &MountEntry,
        stats: &mut CollectStats,
    ) -> Result<(), CollectError> {
        let root_path = PathBuf::from(&mount.mount_point);
        let root_stat = match self.probe.stat(&root_path) {
            Ok(st) => st,
            Err(e) => {
                warn!(mount_point = %mount.mount_point, error = %e, "cannot stat mount point");
                stats.skipped += 1;
                return Ok(());
            }
        };

        let mut inodes: HashMap<u64, Arc<Inode>> = HashMap::new();
        let root_inode = sb.new_inode(root_stat.ino, root_stat.size);
        inodes.insert(root_stat.ino, Arc::clone(&root_inode));
        let root = Arc::new(Dentry::new("/", None, Some(root_inode)));

        let mut examined = 0usize;
        let mut stack = vec![(root_path, root)];
        while let Some((dir, parent)) = stack.pop() {
            let mut children = match self.fs.read_dir(&dir) {
                Ok(children) => children,
                Err(e) => {
                    debug!(path = %dir.display(), error = %e, "skipping unreadable directory");
                    stats.skipped += 1;
                    continue;
                }
            };
            children.sort();

            for path in children {
                if examined >= self.max_files_per_mount {
                    debug!(
                        mount_point = %mount.mount_point,
                        limit = self.max_files_per_mount,
                        "file limit reached"
                    );
                    return Ok(());
                }
                examined += 1;
                stats.entries += 1;

                let st = match self.probe.stat(&path) {
                    Ok(st) => st,
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "skipping entry");
                        stats.skipped += 1;
                        continue;
                    }
                };
                if st.dev != root_stat.dev {
                    trace!(path = %path.display(), device = %st.dev, "other device");
                    continue;
                }

                let inode = match inodes.get(&st.ino) {
                    Some(inode) => Arc::clone(inode),
                    None => {
                        let inode = sb.new_inode(st.ino, st.size);
                        inodes.insert(st.ino, Arc::clone(&inode));
                        if st.kind == FileKind::File {
                            self.load_residency(builder, sb, &inode, &path, stats)?;
                        }
                        inode
                    }
                };

                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let dentry = Arc::new(Dentry::new(name, Some(Arc::clone(&parent)), Some(inode)));
                sb.dentry_lru().add(Arc::clone(&dentry));

                if st.kind == FileKind::Dir {
                    stack.push((path, dentry));
                }
            }
        }
        Ok(())
    }

    fn load_residency(
        &self,
        builder: &mut ImageBuilder,
        sb: &SuperBlock,
        inode: &Arc<Inode>,
        path: &Path,
        stats: &mut CollectStats,
    ) -> Result<(), CollectError> {
        match self.probe.resident_pages(path) {
            Ok(0) => {}
            Ok(pages) => {
                trace!(path = %path.display(), pages, "resident");
                builder.file_frames(inode, pages);
                sb.inode_lru().add(Arc::clone(inode));
                stats.resident_pages += pages;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Unsupported => {
                return Err(CollectError::Unsupported(e.to_string()));
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot probe residency");
                stats.skipped += 1;
            }
        }
        Ok(())
    }
}

/// Picks one mount per block-backed device, in `mountinfo` order.
///
/// A device mounted more than once is walked from the mount of its
/// filesystem root, wherever that appears in the list. Bind mounts of a
/// subtree or a single file are used only when the root is not mounted.
fn select_mounts<'a>(mounts: &'a [MountEntry], block_backed: &HashSet<&str>) -> Vec<&'a MountEntry> {
    let mut selected: Vec<&MountEntry> = Vec::new();
    let mut by_device: HashMap<DeviceId, usize> = HashMap::new();
    for mount in mounts {
        if !block_backed.contains(mount.fs_type.as_str()) {
            trace!(mount_point = %mount.mount_point, fs_type = %mount.fs_type, "not block-backed");
            continue;
        }
        match by_device.get(&mount.device) {
            None => {
                by_device.insert(mount.device, selected.len());
                selected.push(mount);
            }
            Some(&slot) if selected[slot].root != "/" && mount.root == "/" => {
                debug!(
                    mount_point = %mount.mount_point,
                    replaced = %selected[slot].mount_point,
                    device = %mount.device,
                    "root mount replaces bind mount"
                );
                selected[slot] = mount;
            }
            Some(_) => {
                debug!(mount_point = %mount.mount_point, device = %mount.device, "repeated mount of device");
            }
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{HOME_DEV, MockFs, ROOT_DEV};
    use crate::engine::{Accounting, EvictionWalker, FullScan, SUPPORTED_FILESYSTEMS, WalkEvent, WalkMode};

    fn collect(fs: MockFs) -> (MemoryImage, CollectStats) {
        ImageCollector::new(fs.clone(), fs, "/proc")
            .collect_with_stats()
            .unwrap()
    }

    #[test]
    fn test_collect_typical_host_registers_types_and_mounts() {
        let (image, stats) = collect(MockFs::typical_host());
        let registry = image.registry();
        assert_eq!(registry.names(), vec!["ext4", "proc", "sysfs", "tmpfs", "vfat", "xfs"]);
        assert!(!registry.get_fs_type("proc").unwrap().requires_dev());

        // bind mount of /srv collapses into the root superblock
        let ext4 = registry.get_fs_type("ext4").unwrap().supers();
        assert_eq!(ext4.len(), 1);
        assert_eq!(ext4[0].device(), ROOT_DEV);
        assert_eq!(registry.get_fs_type("xfs").unwrap().supers().len(), 1);
        assert!(registry.get_fs_type("tmpfs").unwrap().supers().is_empty());
        assert_eq!(stats.mounts, 2);
    }

    #[test]
    fn test_collect_typical_host_lists() {
        let (image, _) = collect(MockFs::typical_host());
        let sb = &image.registry().get_fs_type("ext4").unwrap().supers()[0];

        // passwd, libc, syslog, index.html
        assert_eq!(sb.inode_lru().len(), 4);
        // 9 directories + 7 file names, root excluded, other devices excluded
        assert_eq!(sb.dentry_lru().len(), 16);
        // root + 9 directories + 6 distinct files
        assert_eq!(sb.inodes().len(), 16);
    }

    #[test]
    fn test_collect_typical_host_frames() {
        let (image, stats) = collect(MockFs::typical_host());
        assert_eq!(stats.resident_pages, 1 + 512 + 128 + 1 + 2);
        assert_eq!(image.memory().total_frames(), 644);

        let index = FullScan::new(image.memory(), image.page_size(), Accounting::PerFrame)
            .scan()
            .unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.total_bytes(), 644 * 4096);
        let home: Vec<_> = index.iter().filter(|r| r.identity.dev == HOME_DEV).collect();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].cached_bytes, 8192);
    }

    #[test]
    fn test_collected_image_walks_inode_lru() {
        let (image, _) = collect(MockFs::typical_host());
        let walker = EvictionWalker::new(image.registry(), image.page_size());
        let mut percents: Vec<u64> = walker
            .walk(SUPPORTED_FILESYSTEMS, WalkMode::InodeLru)
            .filter_map(|e| match e {
                WalkEvent::Object(s) => Some(s.percent_resident()),
                _ => None,
            })
            .collect();
        percents.sort_unstable();
        assert_eq!(percents, vec![50, 50, 100, 100]);
    }

    #[test]
    fn test_collect_prefers_root_mount_over_earlier_bind_mounts() {
        let (image, stats) = collect(MockFs::container_host());
        assert_eq!(stats.mounts, 1);

        let supers = image.registry().get_fs_type("ext4").unwrap().supers();
        assert_eq!(supers.len(), 1);
        assert_eq!(supers[0].mount_point(), Path::new("/"));

        let index = FullScan::new(image.memory(), image.page_size(), Accounting::PerFrame)
            .scan()
            .unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(image.memory().total_frames(), 4);
    }

    #[test]
    fn test_select_mounts_keeps_bind_mount_without_root() {
        let mounts = parse_mountinfo(
            "\
31 1 8:1 /srv /mnt/srv rw - ext4 /dev/sda1 rw
32 1 8:1 /opt /mnt/opt rw - ext4 /dev/sda1 rw
25 1 8:2 / /home rw - xfs /dev/sda2 rw
26 1 0:24 / /run rw - tmpfs tmpfs rw
",
        )
        .unwrap();
        let block_backed: HashSet<&str> = ["ext4", "xfs"].into_iter().collect();
        let points: Vec<&str> = select_mounts(&mounts, &block_backed)
            .iter()
            .map(|m| m.mount_point.as_str())
            .collect();
        assert_eq!(points, vec!["/mnt/srv", "/home"]);
    }

    #[test]
    fn test_collect_respects_file_limit() {
        let fs = MockFs::many_files(50);
        let (image, stats) = ImageCollector::new(fs.clone(), fs, "/proc")
            .with_max_files_per_mount(10)
            .collect_with_stats()
            .unwrap();
        assert_eq!(stats.entries, 10);
        assert!(image.memory().total_frames() < 10);
    }

    #[test]
    fn test_collect_skips_unreadable_entries() {
        let mut fs = MockFs::typical_host();
        fs.deny("/var/log");
        fs.deny("/etc/passwd");
        let (image, stats) = collect(fs);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.resident_pages, 512 + 1 + 2);
        assert_eq!(image.memory().total_frames(), 515);
    }

    #[test]
    fn test_collect_missing_proc_file_is_io_error() {
        let fs = MockFs::new();
        let err = ImageCollector::new(fs.clone(), fs, "/proc").collect().unwrap_err();
        assert!(matches!(err, CollectError::Io(_)));
    }

    #[test]
    fn test_collect_bad_mountinfo_is_parse_error() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/filesystems", "\text4\n");
        fs.add_file("/proc/self/mountinfo", "garbage\n");
        let err = ImageCollector::new(fs.clone(), fs, "/proc").collect().unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));
    }

    #[test]
    fn test_collect_without_residency_is_unsupported() {
        let fs = MockFs::typical_host().without_residency();
        let err = ImageCollector::new(fs.clone(), fs, "/proc").collect().unwrap_err();
        assert!(matches!(err, CollectError::Unsupported(_)));
    }

    #[test]
    fn test_collect_custom_proc_path() {
        let mut fs = MockFs::new();
        fs.add_file("/host/proc/filesystems", "\text4\n");
        fs.add_file("/host/proc/self/mountinfo", "");
        let image = ImageCollector::new(fs.clone(), fs, "/host/proc").collect().unwrap();
        assert_eq!(image.registry().names(), vec!["ext4"]);
        assert_eq!(image.memory().total_frames(), 0);
    }
}
