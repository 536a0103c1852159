//! Runtime configuration shared by the library and the `pcinfo` binary.

use crate::engine::Accounting;
use crate::report::ReportStyle;

/// Knobs for one inspector instance.
///
/// The filesystem allow-list is not configurable here; see
/// [`SUPPORTED_FILESYSTEMS`](crate::engine::SUPPORTED_FILESYSTEMS).
#[derive(Debug, Clone)]
pub struct PcInfoConfig {
    /// Bytes credited per frame in the full scan.
    pub accounting: Accounting,
    /// Maximum distinct files per full scan (`None` = allocator bound).
    pub pool_capacity: Option<usize>,
    pub style: ReportStyle,
    /// First output buffer size for a report read.
    pub sink_initial: usize,
    /// Largest output buffer a report may grow to.
    pub sink_max: usize,
    /// Files examined per mounted filesystem by the live collector.
    pub max_files_per_mount: usize,
    /// Path to the proc filesystem.
    pub proc_path: String,
}

impl PcInfoConfig {
    pub const DEFAULT_SINK_INITIAL: usize = 4096;
    pub const DEFAULT_SINK_MAX: usize = 64 * 1024 * 1024;
    pub const DEFAULT_MAX_FILES_PER_MOUNT: usize = 100_000;

    pub fn new(accounting: Accounting, pool_capacity: Option<usize>) -> Self {
        Self {
            accounting,
            pool_capacity,
            ..Self::default()
        }
    }

    pub fn with_style(mut self, style: ReportStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_proc_path(mut self, proc_path: impl Into<String>) -> Self {
        self.proc_path = proc_path.into();
        self
    }

    pub fn with_max_files_per_mount(mut self, max_files: usize) -> Self {
        self.max_files_per_mount = max_files;
        self
    }
}

impl Default for PcInfoConfig {
    fn default() -> Self {
        Self {
            accounting: Accounting::default(),
            pool_capacity: None,
            style: ReportStyle::default(),
            sink_initial: Self::DEFAULT_SINK_INITIAL,
            sink_max: Self::DEFAULT_SINK_MAX,
            max_files_per_mount: Self::DEFAULT_MAX_FILES_PER_MOUNT,
            proc_path: "/proc".to_string(),
        }
    }
}
