//! Ordered per-file accumulation index.
//!
//! Records live in a [`RecordArena`] owned by one scan; a `BTreeMap` keyed by
//! [`FileIdentity`] points into it. Repeated observations of a file fold into
//! the same record.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;

use crate::mem::FileIdentity;

/// Error type for scan failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The record arena could not take another record.
    OutOfResources {
        /// Configured arena bound, `None` when the allocator refused to grow
        /// the arena.
        capacity: Option<usize>,
    },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::OutOfResources {
                capacity: Some(capacity),
            } => write!(f, "out of resources: record arena full ({} records)", capacity),
            ScanError::OutOfResources { capacity: None } => {
                write!(f, "out of resources: record allocation failed")
            }
        }
    }
}

impl std::error::Error for ScanError {}

/// Accumulated cache residency of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheRecord {
    pub identity: FileIdentity,
    pub cached_bytes: u64,
}

/// Scan-scoped record storage, released as a unit.
#[derive(Debug, Default)]
pub struct RecordArena {
    records: Vec<CacheRecord>,
    capacity: Option<usize>,
}

impl RecordArena {
    /// Arena bounded by the allocator only.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Arena that refuses to hold more than `capacity` records.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity: Some(capacity),
        }
    }

    fn alloc(&mut self, record: CacheRecord) -> Result<usize, ScanError> {
        if let Some(capacity) = self.capacity {
            if self.records.len() >= capacity {
                return Err(ScanError::OutOfResources {
                    capacity: Some(capacity),
                });
            }
        }
        self.records
            .try_reserve(1)
            .map_err(|_| ScanError::OutOfResources { capacity: None })?;
        self.records.push(record);
        Ok(self.records.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordered index of [`CacheRecord`]s keyed by file identity.
#[derive(Debug, Default)]
pub struct CacheIndex {
    tree: BTreeMap<FileIdentity, usize>,
    arena: RecordArena,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arena(arena: RecordArena) -> Self {
        Self {
            tree: BTreeMap::new(),
            arena,
        }
    }

    /// Adds `bytes` to the record for `identity`, creating it on first sight.
    ///
    /// Only the arena is reserved fallibly: a full or unallocatable arena is
    /// reported as [`ScanError::OutOfResources`] and leaves the index as it
    /// was. Tree nodes come from the global allocator, and failing to
    /// allocate one aborts like any other `BTreeMap` insertion.
    pub fn upsert(&mut self, identity: FileIdentity, bytes: u64) -> Result<(), ScanError> {
        match self.tree.entry(identity) {
            Entry::Occupied(slot) => {
                let record = &mut self.arena.records[*slot.get()];
                record.cached_bytes = record.cached_bytes.saturating_add(bytes);
            }
            Entry::Vacant(slot) => {
                let id = self.arena.alloc(CacheRecord {
                    identity,
                    cached_bytes: bytes,
                })?;
                slot.insert(id);
            }
        }
        Ok(())
    }

    pub fn get(&self, identity: &FileIdentity) -> Option<&CacheRecord> {
        self.tree.get(identity).map(|&id| &self.arena.records[id])
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Sum of cached bytes over all records.
    pub fn total_bytes(&self) -> u64 {
        self.arena
            .records
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.cached_bytes))
    }

    /// Records in identity order without consuming the index.
    pub fn iter(&self) -> impl Iterator<Item = &CacheRecord> {
        self.tree.values().map(|&id| &self.arena.records[id])
    }

    /// Consumes the index, yielding every record once in identity order.
    pub fn drain(self) -> impl Iterator<Item = CacheRecord> {
        let records = self.arena.records;
        self.tree.into_values().map(move |id| records[id])
    }
}
