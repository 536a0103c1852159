//! Host collection for Linux.
//!
//! This module builds a [`MemoryImage`] of the running machine from the
//! `/proc` filesystem and per-file residency probes, with support for mocking
//! for testing on macOS.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ImageCollector                        │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  procfs parsers     │   │  mount tree walk            │  │
//! │  │  - /proc/filesystems│   │  - dentries, inodes         │  │
//! │  │  - mountinfo        │   │  - resident pages → frames  │  │
//! │  └──────────┬──────────┘   └──────────────┬──────────────┘  │
//! │             │                             │                 │
//! │      ┌──────▼──────┐              ┌───────▼────────┐        │
//! │      │  FileSystem │ (trait)      │ ResidencyProbe │ (trait)│
//! │      └──────┬──────┘              └───────┬────────┘        │
//! └─────────────┼─────────────────────────────┼─────────────────┘
//!               │                             │
//!       ┌───────▼───────┐  ┌─────────────┐  ┌─▼────────────┐
//!       │    RealFs     │  │   MockFs    │  │ MincoreProbe │
//!       │   (Linux)     │  │ (both, for  │  │   (Linux)    │
//!       └───────────────┘  │  testing)   │  └──────────────┘
//!                          └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use pcinfo_core::collector::{ImageCollector, MincoreProbe, RealFs};
//!
//! let collector = ImageCollector::new(RealFs::new(), MincoreProbe::new(), "/proc");
//! let image = collector.collect().unwrap();
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use pcinfo_core::collector::{ImageCollector, MockFs};
//!
//! let fs = MockFs::typical_host();
//! let collector = ImageCollector::new(fs.clone(), fs, "/proc");
//! let image = collector.collect().unwrap();
//! assert!(image.memory().total_frames() > 0);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod procfs;
pub mod traits;

use std::sync::Arc;

use crate::mem::MemoryImage;

pub use collector::{CollectError, CollectStats, ImageCollector};
pub use mock::MockFs;
pub use procfs::ParseError;
pub use traits::{FileKind, FileStat, FileSystem, MincoreProbe, RealFs, ResidencyProbe};

/// Where report queries get their memory image from.
pub trait HostSource: Send + Sync {
    /// Returns the image a query should scan.
    fn image(&self) -> Result<Arc<MemoryImage>, CollectError>;
}

/// A fixed image, shared by every query.
impl HostSource for Arc<MemoryImage> {
    fn image(&self) -> Result<Arc<MemoryImage>, CollectError> {
        Ok(Arc::clone(self))
    }
}

/// A fresh snapshot per query.
impl<F: FileSystem, P: ResidencyProbe> HostSource for ImageCollector<F, P> {
    fn image(&self) -> Result<Arc<MemoryImage>, CollectError> {
        self.collect().map(Arc::new)
    }
}
