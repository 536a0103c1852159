//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait covers the `/proc` text files the collector parses;
//! `ResidencyProbe` covers per-file facts (identity, size, resident pages)
//! that only a real kernel can answer. Both have mock implementations in
//! [`crate::collector::mock`].

use std::io;
use std::path::{Path, PathBuf};

use crate::mem::DeviceId;

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// `lstat`-style facts about one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub dev: DeviceId,
    pub ino: u64,
    pub size: u64,
    pub kind: FileKind,
}

/// Source of per-file identity and page-cache residency.
pub trait ResidencyProbe: Send + Sync {
    /// Frame size used to convert resident pages to bytes.
    fn page_size(&self) -> u64;

    /// Stats `path` without following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Number of the file's pages currently in the page cache.
    fn resident_pages(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by `lstat(2)` and `mincore(2)`.
#[derive(Debug, Clone, Copy)]
pub struct MincoreProbe {
    page_size: u64,
}

impl MincoreProbe {
    /// Pages queried per `mincore` call.
    const WINDOW_PAGES: usize = 64 * 1024;

    pub fn new() -> Self {
        Self {
            page_size: system_page_size(),
        }
    }
}

impl Default for MincoreProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn system_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { crate::mem::DEFAULT_PAGE_SIZE }
}

#[cfg(not(unix))]
fn system_page_size() -> u64 {
    crate::mem::DEFAULT_PAGE_SIZE
}

impl ResidencyProbe for MincoreProbe {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    #[cfg(unix)]
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::symlink_metadata(path)?;
        let ft = meta.file_type();
        let kind = if ft.is_file() {
            FileKind::File
        } else if ft.is_dir() {
            FileKind::Dir
        } else if ft.is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::Other
        };
        Ok(FileStat {
            dev: DeviceId::from_raw(meta.dev()),
            ino: meta.ino(),
            size: meta.size(),
            kind,
        })
    }

    #[cfg(not(unix))]
    fn stat(&self, _path: &Path) -> io::Result<FileStat> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "inode identity requires a unix platform",
        ))
    }

    #[cfg(target_os = "linux")]
    fn resident_pages(&self, path: &Path) -> io::Result<u64> {
        use std::os::unix::io::AsRawFd;

        let file = std::fs::File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(0);
        }

        // SAFETY: read-only shared mapping of a file we hold open; unmapped below.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let page = self.page_size as usize;
        let total_pages = len.div_ceil(page);
        let mut vec = vec![0u8; total_pages.min(Self::WINDOW_PAGES)];
        let mut resident = 0u64;
        let mut done = 0usize;
        let mut result = Ok(());

        while done < total_pages {
            let pages = (total_pages - done).min(Self::WINDOW_PAGES);
            let offset = done * page;
            let bytes = (pages * page).min(len - offset);
            // SAFETY: [addr + offset, +bytes) lies inside the mapping and `vec`
            // holds at least one byte per page of that range.
            let rc = unsafe {
                libc::mincore(
                    addr.cast::<u8>().add(offset).cast(),
                    bytes,
                    vec.as_mut_ptr(),
                )
            };
            if rc != 0 {
                result = Err(io::Error::last_os_error());
                break;
            }
            resident += vec[..pages].iter().filter(|b| **b & 1 == 1).count() as u64;
            done += pages;
        }

        // SAFETY: same address and length as the successful mmap above.
        unsafe {
            libc::munmap(addr, len);
        }
        result.map(|()| resident)
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_pages(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "page-cache residency requires Linux mincore",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
    }

    #[test]
    fn test_real_fs_exists() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        assert!(fs.exists(&cargo_toml));
        assert!(!fs.exists(Path::new("/nonexistent/path/12345")));
    }

    #[test]
    fn test_real_fs_read_dir() {
        let fs = RealFs::new();
        let src_dir = env::current_dir().unwrap().join("src");
        let entries = fs.read_dir(&src_dir).unwrap();
        assert!(entries.iter().any(|p| p.ends_with("lib.rs")));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_stat_distinguishes_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, vec![7u8; 10_000]).unwrap();

        let probe = MincoreProbe::new();
        let st = probe.stat(&file).unwrap();
        assert_eq!(st.kind, FileKind::File);
        assert_eq!(st.size, 10_000);
        assert_eq!(probe.stat(dir.path()).unwrap().kind, FileKind::Dir);
        assert_eq!(probe.stat(dir.path()).unwrap().dev, st.dev);
        assert!(probe.page_size() >= 4096);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_probe_resident_pages_bounded_by_file_pages() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, vec![1u8; 64 * 1024]).unwrap();
        // freshly written pages are normally still cached; the bound always holds
        let probe = MincoreProbe::new();
        let pages = probe.resident_pages(&file).unwrap();
        assert!(pages <= (64 * 1024u64).div_ceil(probe.page_size()));

        let empty = dir.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(probe.resident_pages(&empty).unwrap(), 0);
    }
}
