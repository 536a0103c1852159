//! Named read-only report files.
//!
//! A [`ProcRoot`] maps names to show callbacks. Opening a name yields a
//! [`SeqFile`]; its first read runs the callback once into a [`BoundedSink`],
//! growing the sink and re-running on overflow, then serves the buffered text.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::collector::CollectError;
use crate::config::PcInfoConfig;
use crate::engine::ScanError;
use crate::report::BoundedSink;

/// Errors that abort a report before any text is served.
#[derive(Debug)]
pub enum ReportError {
    Scan(ScanError),
    Collect(CollectError),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Scan(e) => write!(f, "scan failed: {}", e),
            ReportError::Collect(e) => write!(f, "collection failed: {}", e),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Scan(e) => Some(e),
            ReportError::Collect(e) => Some(e),
        }
    }
}

impl From<ScanError> for ReportError {
    fn from(e: ScanError) -> Self {
        ReportError::Scan(e)
    }
}

impl From<CollectError> for ReportError {
    fn from(e: CollectError) -> Self {
        ReportError::Collect(e)
    }
}

/// Errors from entry registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Exists(String),
    NotFound(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Exists(name) => write!(f, "entry {} already exists", name),
            TransportError::NotFound(name) => write!(f, "no entry named {}", name),
        }
    }
}

impl std::error::Error for TransportError {}

/// Renders one report into a sink.
pub type ShowFn = dyn Fn(&mut BoundedSink) -> Result<(), ReportError> + Send + Sync;

/// Registry of named report entries.
pub struct ProcRoot {
    entries: RwLock<BTreeMap<String, Arc<ShowFn>>>,
    sink_initial: usize,
    sink_max: usize,
}

impl ProcRoot {
    /// Sink sizes are clamped so that `1 <= sink_initial <= sink_max`.
    pub fn new(sink_initial: usize, sink_max: usize) -> Self {
        let sink_initial = sink_initial.max(1);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            sink_initial,
            sink_max: sink_max.max(sink_initial),
        }
    }

    pub fn from_config(config: &PcInfoConfig) -> Self {
        Self::new(config.sink_initial, config.sink_max)
    }

    pub fn register<F>(&self, name: &str, show: F) -> Result<(), TransportError>
    where
        F: Fn(&mut BoundedSink) -> Result<(), ReportError> + Send + Sync + 'static,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(name) {
            return Err(TransportError::Exists(name.to_string()));
        }
        entries.insert(name.to_string(), Arc::new(show));
        debug!(name, "entry registered");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), TransportError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.remove(name) {
            Some(_) => {
                debug!(name, "entry removed");
                Ok(())
            }
            None => Err(TransportError::NotFound(name.to_string())),
        }
    }

    pub fn open(&self, name: &str) -> Result<SeqFile, TransportError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let show = entries
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(name.to_string()))?;
        Ok(SeqFile {
            show,
            sink_initial: self.sink_initial,
            sink_max: self.sink_max,
            buf: None,
            pos: 0,
        })
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for ProcRoot {
    fn default() -> Self {
        Self::new(PcInfoConfig::DEFAULT_SINK_INITIAL, PcInfoConfig::DEFAULT_SINK_MAX)
    }
}

impl std::fmt::Debug for ProcRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcRoot")
            .field("entries", &self.names())
            .field("sink_initial", &self.sink_initial)
            .field("sink_max", &self.sink_max)
            .finish()
    }
}

/// An open report. The show callback runs at most once per successful fill.
pub struct SeqFile {
    show: Arc<ShowFn>,
    sink_initial: usize,
    sink_max: usize,
    buf: Option<String>,
    pos: u64,
}

impl SeqFile {
    fn fill(&mut self) -> io::Result<&str> {
        if self.buf.is_none() {
            let mut capacity = self.sink_initial;
            let text = loop {
                let mut sink = BoundedSink::new(capacity);
                (self.show)(&mut sink).map_err(io::Error::other)?;
                if !sink.overflowed() {
                    break sink.into_string();
                }
                if capacity >= self.sink_max {
                    return Err(io::Error::new(
                        io::ErrorKind::OutOfMemory,
                        format!("report exceeds {} bytes", self.sink_max),
                    ));
                }
                capacity = capacity.saturating_mul(2).min(self.sink_max);
                trace!(capacity, "report overflowed, retrying");
            };
            self.buf = Some(text);
        }
        Ok(self.buf.as_deref().unwrap_or_default())
    }
}

impl Read for SeqFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let pos = self.pos;
        let text = self.fill()?.as_bytes();
        let start = usize::try_from(pos).unwrap_or(usize::MAX).min(text.len());
        let n = out.len().min(text.len() - start);
        out[..n].copy_from_slice(&text[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

/// Supports absolute and relative positioning only.
impl Seek for SeqFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "seek from end is not supported",
                ));
            }
        };
        self.pos = new.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        Ok(self.pos)
    }
}

impl std::fmt::Debug for SeqFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqFile")
            .field("filled", &self.buf.is_some())
            .field("pos", &self.pos)
            .finish()
    }
}
