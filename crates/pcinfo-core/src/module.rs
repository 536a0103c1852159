//! The four report entries and their lifecycle.
//!
//! [`PcInfoModule::init`] registers one entry per [`ReportKind`] on a
//! [`ProcRoot`]; dropping the module removes them again. Every read of a
//! fresh handle asks the [`HostSource`] for an image and renders one report.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::collector::HostSource;
use crate::config::PcInfoConfig;
use crate::engine::{CacheRecord, EvictionWalker, FullScan, SUPPORTED_FILESYSTEMS, ScanError, WalkEvent, WalkMode};
use crate::mem::MemoryImage;
use crate::report::{BoundedSink, write_records, write_walk};
use crate::transport::{ProcRoot, ReportError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Full scan of physical memory, one line per cached file.
    PageCache,
    /// Dentry LRU of allow-listed filesystems.
    Dentries,
    /// Inode LRU of allow-listed filesystems.
    InodeLru,
    /// Every live inode of allow-listed filesystems.
    AllInodes,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::PageCache,
        ReportKind::Dentries,
        ReportKind::InodeLru,
        ReportKind::AllInodes,
    ];

    pub fn entry_name(&self) -> &'static str {
        match self {
            ReportKind::PageCache => "pagecache_info",
            ReportKind::Dentries => "dentrycache_info",
            ReportKind::InodeLru => "inodecache_info",
            ReportKind::AllInodes => "inodes_info",
        }
    }

    fn walk_mode(&self) -> Option<WalkMode> {
        match self {
            ReportKind::PageCache => None,
            ReportKind::Dentries => Some(WalkMode::Dentries),
            ReportKind::InodeLru => Some(WalkMode::InodeLru),
            ReportKind::AllInodes => Some(WalkMode::AllInodes),
        }
    }
}

/// A report as structured data, for machine-readable output.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportData {
    Records(Vec<CacheRecord>),
    Walk(Vec<WalkEvent>),
}

/// Produces the data behind one report.
pub fn build_report(kind: ReportKind, image: &MemoryImage, config: &PcInfoConfig) -> Result<ReportData, ScanError> {
    match kind.walk_mode() {
        None => {
            let index = FullScan::new(image.memory(), image.page_size(), config.accounting)
                .with_arena_capacity(config.pool_capacity)
                .scan()?;
            Ok(ReportData::Records(index.drain().collect()))
        }
        Some(mode) => {
            let walker = EvictionWalker::new(image.registry(), image.page_size());
            Ok(ReportData::Walk(walker.walk(SUPPORTED_FILESYSTEMS, mode).collect()))
        }
    }
}

/// Renders one report as text. A failed scan writes nothing.
pub fn render_report(
    kind: ReportKind,
    sink: &mut BoundedSink,
    image: &MemoryImage,
    config: &PcInfoConfig,
) -> Result<(), ScanError> {
    match kind.walk_mode() {
        None => {
            let index = FullScan::new(image.memory(), image.page_size(), config.accounting)
                .with_arena_capacity(config.pool_capacity)
                .scan()?;
            write_records(sink, index.drain(), config.style);
        }
        Some(mode) => {
            let walker = EvictionWalker::new(image.registry(), image.page_size());
            write_walk(sink, walker.walk(SUPPORTED_FILESYSTEMS, mode), config.style);
        }
    }
    Ok(())
}

/// Registered report entries. Dropping the module removes them.
pub struct PcInfoModule {
    root: Arc<ProcRoot>,
    registered: Vec<&'static str>,
}

impl PcInfoModule {
    /// Registers all report entries, or none if any name is taken.
    pub fn init(root: Arc<ProcRoot>, source: Arc<dyn HostSource>, config: PcInfoConfig) -> Result<Self, TransportError> {
        let mut module = Self {
            root,
            registered: Vec::with_capacity(ReportKind::ALL.len()),
        };

        for kind in ReportKind::ALL {
            let source = Arc::clone(&source);
            let config = config.clone();
            // on error `module` drops here and removes what was registered so far
            module.root.register(kind.entry_name(), move |sink: &mut BoundedSink| {
                let image = source.image()?;
                render_report(kind, sink, &image, &config)?;
                Ok::<(), ReportError>(())
            })?;
            module.registered.push(kind.entry_name());
        }

        info!(
            entries = module.registered.len(),
            accounting = config.accounting.name(),
            "report entries registered"
        );
        Ok(module)
    }

    pub fn root(&self) -> &Arc<ProcRoot> {
        &self.root
    }

    pub fn entries(&self) -> &[&'static str] {
        &self.registered
    }
}

impl Drop for PcInfoModule {
    fn drop(&mut self) {
        for name in self.registered.drain(..) {
            if let Err(e) = self.root.remove(name) {
                warn!(name, error = %e, "entry already removed");
            }
        }
    }
}

impl std::fmt::Debug for PcInfoModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcInfoModule")
            .field("registered", &self.registered)
            .finish()
    }
}
