//! pcinfo-core: page-cache residency inspection.
//!
//! Provides:
//! - `mem`: model of physical memory and filesystem objects (memory image)
//! - `engine`: full-scan aggregation and eviction-list walks
//! - `collector`: builds memory images from `/proc` and `mincore(2)`
//! - `report`: line-oriented rendering into bounded sinks
//! - `transport`: named report files with retry-on-overflow reads
//! - `module`: registration of the four report entries
//! - `config`: runtime knobs
//! - `fmt`: shared formatting helpers (bytes)

pub mod collector;
pub mod config;
pub mod engine;
pub mod fmt;
pub mod mem;
pub mod module;
pub mod report;
pub mod transport;
