//! Filesystem-side objects: identities, inodes, dentries, superblocks and
//! the registry of filesystem types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use super::epoch::ReadEpoch;
use super::lru::ListLru;

/// Block device number split into major/minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

impl DeviceId {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Decodes a raw `st_dev` value using the Linux encoding.
    pub fn from_raw(dev: u64) -> Self {
        let major = ((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff);
        let minor = (dev & 0xff) | ((dev >> 12) & !0xff);
        Self {
            major: major as u32,
            minor: minor as u32,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Stable identity of a cached file: device plus inode number.
///
/// Ordered by device first, then inode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileIdentity {
    pub dev: DeviceId,
    pub ino: u64,
}

impl FileIdentity {
    pub const fn new(dev: DeviceId, ino: u64) -> Self {
        Self { dev, ino }
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dev, self.ino)
    }
}

/// In-memory inode. Size and resident page count change underneath readers.
#[derive(Debug)]
pub struct Inode {
    identity: FileIdentity,
    size: AtomicU64,
    nrpages: AtomicU64,
}

impl Inode {
    pub fn new(identity: FileIdentity, size: u64) -> Self {
        Self {
            identity,
            size: AtomicU64::new(size),
            nrpages: AtomicU64::new(0),
        }
    }

    pub fn identity(&self) -> FileIdentity {
        self.identity
    }

    pub fn ino(&self) -> u64 {
        self.identity.ino
    }

    /// Nominal file size in bytes.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Pages of this file currently in the page cache.
    pub fn nrpages(&self) -> u64 {
        self.nrpages.load(Ordering::Relaxed)
    }

    pub fn set_nrpages(&self, pages: u64) {
        self.nrpages.store(pages, Ordering::Relaxed);
    }

    pub fn add_nrpages(&self, pages: u64) {
        self.nrpages.fetch_add(pages, Ordering::Relaxed);
    }
}

/// Directory entry. A dentry without an inode is negative.
#[derive(Debug)]
pub struct Dentry {
    name: String,
    parent: Option<Arc<Dentry>>,
    inode: Option<Arc<Inode>>,
}

impl Dentry {
    pub fn new(name: impl Into<String>, parent: Option<Arc<Dentry>>, inode: Option<Arc<Inode>>) -> Self {
        Self {
            name: name.into(),
            parent,
            inode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inode(&self) -> Option<&Arc<Inode>> {
        self.inode.as_ref()
    }

    pub fn is_negative(&self) -> bool {
        self.inode.is_none()
    }

    /// Renders at most `depth` trailing path components joined by `/`.
    ///
    /// The root dentry is named `/` and is never joined with an extra slash.
    pub fn path(&self, depth: usize) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let mut cursor = Some(self);
        while let Some(d) = cursor {
            if parts.len() == depth {
                break;
            }
            parts.push(d.name.as_str());
            cursor = d.parent.as_deref();
        }
        parts.reverse();

        let mut out = String::new();
        for part in parts {
            if !out.is_empty() && !out.ends_with('/') {
                out.push('/');
            }
            out.push_str(part);
        }
        out
    }
}

/// A mounted filesystem instance.
#[derive(Debug)]
pub struct SuperBlock {
    fs_type: String,
    device: DeviceId,
    mount_point: PathBuf,
    dentry_lru: ListLru<Dentry>,
    inode_lru: ListLru<Inode>,
    inodes: ListLru<Inode>,
}

impl SuperBlock {
    pub fn new(
        fs_type: impl Into<String>,
        device: DeviceId,
        mount_point: impl Into<PathBuf>,
        epoch: &Arc<ReadEpoch>,
    ) -> Self {
        Self {
            fs_type: fs_type.into(),
            device,
            mount_point: mount_point.into(),
            dentry_lru: ListLru::new(Arc::clone(epoch)),
            inode_lru: ListLru::new(Arc::clone(epoch)),
            inodes: ListLru::new(Arc::clone(epoch)),
        }
    }

    pub fn fs_type(&self) -> &str {
        &self.fs_type
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Unused dentries eligible for reclaim.
    pub fn dentry_lru(&self) -> &ListLru<Dentry> {
        &self.dentry_lru
    }

    /// Unused inodes eligible for reclaim.
    pub fn inode_lru(&self) -> &ListLru<Inode> {
        &self.inode_lru
    }

    /// Every live inode of this instance.
    pub fn inodes(&self) -> &ListLru<Inode> {
        &self.inodes
    }

    /// Allocates an inode on this device and links it into the live list.
    pub fn new_inode(&self, ino: u64, size: u64) -> Arc<Inode> {
        let inode = Arc::new(Inode::new(FileIdentity::new(self.device, ino), size));
        self.inodes.add(Arc::clone(&inode));
        inode
    }
}

/// A registered filesystem type and its mounted instances.
#[derive(Debug)]
pub struct FsType {
    name: String,
    requires_dev: bool,
    supers: RwLock<Vec<Arc<SuperBlock>>>,
}

impl FsType {
    pub fn new(name: impl Into<String>, requires_dev: bool) -> Self {
        Self {
            name: name.into(),
            requires_dev,
            supers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False for `nodev` types (tmpfs, proc, ...).
    pub fn requires_dev(&self) -> bool {
        self.requires_dev
    }

    pub fn add_super(&self, sb: Arc<SuperBlock>) {
        self.supers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sb);
    }

    /// Snapshot of the currently mounted instances.
    pub fn supers(&self) -> Vec<Arc<SuperBlock>> {
        self.supers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Registry of filesystem types, keyed by name.
#[derive(Debug)]
pub struct FsRegistry {
    epoch: Arc<ReadEpoch>,
    types: RwLock<BTreeMap<String, Arc<FsType>>>,
}

impl FsRegistry {
    pub fn new(epoch: Arc<ReadEpoch>) -> Self {
        Self {
            epoch,
            types: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn epoch(&self) -> &Arc<ReadEpoch> {
        &self.epoch
    }

    /// Registers a type, returning the existing entry when already present.
    pub fn register(&self, name: &str, requires_dev: bool) -> Arc<FsType> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            types
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(FsType::new(name, requires_dev))),
        )
    }

    pub fn get_fs_type(&self, name: &str) -> Option<Arc<FsType>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered type names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Creates a superblock and attaches it to `fs_type`, registering the
    /// type on first use.
    pub fn mount(&self, fs_type: &str, device: DeviceId, mount_point: impl Into<PathBuf>) -> Arc<SuperBlock> {
        let ty = self.register(fs_type, true);
        let sb = Arc::new(SuperBlock::new(fs_type, device, mount_point, &self.epoch));
        ty.add_super(Arc::clone(&sb));
        sb
    }
}
