//! Frame → owning file resolution.

use serde::Serialize;

use crate::mem::{FileIdentity, Frame, PageFlags};

/// How many bytes one observed frame contributes to its file's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Accounting {
    /// One frame size per observed frame.
    #[default]
    PerFrame,
    /// The owning file's whole resident size, re-read for every observed
    /// frame. A file with N resident frames ends up counted N times over;
    /// kept for output compatibility with the historical report.
    FileLevel,
}

impl Accounting {
    pub fn name(&self) -> &'static str {
        match self {
            Accounting::PerFrame => "per-frame",
            Accounting::FileLevel => "file-level",
        }
    }
}

impl std::str::FromStr for Accounting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-frame" => Ok(Accounting::PerFrame),
            "file-level" => Ok(Accounting::FileLevel),
            other => Err(format!("unknown accounting mode '{}'", other)),
        }
    }
}

/// A frame attributed to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub identity: FileIdentity,
    pub bytes: u64,
}

/// Decides whether a frame is file-backed page cache and who owns it.
#[derive(Debug, Clone, Copy)]
pub struct FrameResolver {
    page_size: u64,
    accounting: Accounting,
}

impl FrameResolver {
    pub fn new(page_size: u64, accounting: Accounting) -> Self {
        Self {
            page_size,
            accounting,
        }
    }

    pub fn accounting(&self) -> Accounting {
        self.accounting
    }

    /// Returns `None` for anonymous memory, frames without private cache
    /// data, and frames whose mapping or host is gone.
    pub fn resolve(&self, frame: &Frame) -> Option<Resolved> {
        let view = frame.view();
        if view.flags.contains(PageFlags::ANON) || !view.flags.contains(PageFlags::PRIVATE) {
            return None;
        }
        let mapping = view.mapping?;
        let host = mapping.host()?;

        let bytes = match self.accounting {
            Accounting::PerFrame => self.page_size,
            Accounting::FileLevel => host.nrpages().saturating_mul(self.page_size),
        };
        Some(Resolved {
            identity: host.identity(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{DeviceId, Inode, Mapping};
    use std::sync::Arc;

    fn inode(nrpages: u64) -> Arc<Inode> {
        let inode = Arc::new(Inode::new(FileIdentity::new(DeviceId::new(8, 1), 42), 1 << 20));
        inode.set_nrpages(nrpages);
        inode
    }

    #[test]
    fn test_anonymous_and_plain_frames_are_skipped() {
        let resolver = FrameResolver::new(4096, Accounting::PerFrame);
        let file = inode(1);

        let anon = Frame::new(0, PageFlags::ANON | PageFlags::PRIVATE, Some(Mapping::of(&file)));
        assert!(resolver.resolve(&anon).is_none());

        let not_private = Frame::new(1, PageFlags::LRU, Some(Mapping::of(&file)));
        assert!(resolver.resolve(&not_private).is_none());

        let no_mapping = Frame::new(2, PageFlags::PRIVATE, None);
        assert!(resolver.resolve(&no_mapping).is_none());

        let orphan = Frame::new(3, PageFlags::PRIVATE, Some(Arc::new(Mapping::new(None))));
        assert!(resolver.resolve(&orphan).is_none());
    }

    #[test]
    fn test_per_frame_accounting() {
        let resolver = FrameResolver::new(4096, Accounting::PerFrame);
        let file = inode(10);
        let frame = Frame::new(0, PageFlags::PRIVATE, Some(Mapping::of(&file)));
        let got = resolver.resolve(&frame).unwrap();
        assert_eq!(got.bytes, 4096);
        assert_eq!(got.identity.ino, 42);
    }

    #[test]
    fn test_file_level_accounting_reads_current_page_count() {
        let resolver = FrameResolver::new(4096, Accounting::FileLevel);
        let file = inode(10);
        let frame = Frame::new(0, PageFlags::PRIVATE, Some(Mapping::of(&file)));
        assert_eq!(resolver.resolve(&frame).unwrap().bytes, 40960);

        file.set_nrpages(3);
        assert_eq!(resolver.resolve(&frame).unwrap().bytes, 12288);
    }

    #[test]
    fn test_accounting_from_str() {
        assert_eq!("per-frame".parse::<Accounting>(), Ok(Accounting::PerFrame));
        assert_eq!("file-level".parse::<Accounting>(), Ok(Accounting::FileLevel));
        assert!("both".parse::<Accounting>().is_err());
    }
}
