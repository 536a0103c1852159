//! Parsers for the Linux `/proc` inputs the collector reads.

pub mod parser;

pub use parser::{FsTypeEntry, MountEntry, ParseError, parse_filesystems, parse_mountinfo};
