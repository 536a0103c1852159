//! In-memory mock host for testing collectors without real `/proc`.
//!
//! `MockFs` simulates both the `/proc` text files and the per-file facts a
//! [`ResidencyProbe`] reports, so collection can be tested on macOS and in CI
//! environments without Linux.

use crate::collector::traits::{FileKind, FileStat, FileSystem, ResidencyProbe};
use crate::mem::{DEFAULT_PAGE_SIZE, DeviceId};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem and residency table for testing.
#[derive(Debug, Clone)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    stats: HashMap<PathBuf, FileStat>,
    resident: HashMap<PathBuf, u64>,
    /// Paths that fail every operation with `PermissionDenied`.
    denied: HashSet<PathBuf>,
    residency_supported: bool,
    next_ino: u64,
}

impl Default for MockFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            directories: HashSet::new(),
            stats: HashMap::new(),
            resident: HashMap::new(),
            denied: HashSet::new(),
            residency_supported: true,
            next_ino: 2,
        }
    }

    /// Makes every residency query fail as on a platform without `mincore`.
    pub fn without_residency(mut self) -> Self {
        self.residency_supported = false;
        self
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds a directory that is the root of the filesystem on `dev`.
    pub fn mount_dir(&mut self, path: impl AsRef<Path>, dev: DeviceId) {
        let path = path.as_ref().to_path_buf();
        self.add_dir(&path);
        let stat = self.new_stat(dev, DEFAULT_PAGE_SIZE, FileKind::Dir);
        self.stats.insert(path, stat);
    }

    /// Adds a regular file on `dev` with `resident_pages` of it in the page cache.
    ///
    /// Parent directories without stats of their own are placed on `dev` too.
    pub fn add_cached_file(&mut self, path: impl AsRef<Path>, dev: DeviceId, size: u64, resident_pages: u64) {
        let path = path.as_ref().to_path_buf();
        self.add_file(&path, "");

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() && !self.stats.contains_key(p) {
                let stat = self.new_stat(dev, DEFAULT_PAGE_SIZE, FileKind::Dir);
                self.stats.insert(p.to_path_buf(), stat);
            }
            parent = p.parent();
        }

        let stat = self.new_stat(dev, size, FileKind::File);
        self.stats.insert(path.clone(), stat);
        self.resident.insert(path, resident_pages);
    }

    /// Adds `link` as a second name for the file at `existing`.
    pub fn add_hard_link(&mut self, existing: impl AsRef<Path>, link: impl AsRef<Path>) {
        let existing = existing.as_ref();
        let link = link.as_ref().to_path_buf();
        let Some(stat) = self.stats.get(existing).copied() else {
            return;
        };
        let pages = self.resident.get(existing).copied().unwrap_or(0);
        self.add_file(&link, "");
        self.stats.insert(link.clone(), stat);
        self.resident.insert(link, pages);
    }

    /// Makes `path` unreadable.
    pub fn deny(&mut self, path: impl AsRef<Path>) {
        self.denied.insert(path.as_ref().to_path_buf());
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    fn new_stat(&mut self, dev: DeviceId, size: u64, kind: FileKind) -> FileStat {
        let ino = self.next_ino;
        self.next_ino += 1;
        FileStat { dev, ino, size, kind }
    }

    fn check_access(&self, path: &Path) -> io::Result<()> {
        if self.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {:?}", path),
            ));
        }
        Ok(())
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.check_access(path)?;
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.check_access(path)?;
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

impl ResidencyProbe for MockFs {
    fn page_size(&self) -> u64 {
        DEFAULT_PAGE_SIZE
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.check_access(path)?;
        self.stats.get(path).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no stat for {:?}", path))
        })
    }

    fn resident_pages(&self, path: &Path) -> io::Result<u64> {
        if !self.residency_supported {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "page-cache residency not available",
            ));
        }
        self.check_access(path)?;
        self.resident.get(path).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("file not found: {:?}", path))
        })
    }
}
