//! Line-oriented text rendering of scan results.
//!
//! Output goes into a [`BoundedSink`]. Writes are best-effort: once a line
//! does not fit, it and everything after it is dropped and the sink is
//! marked overflowed so the transport can retry with a larger buffer.

use std::fmt;

use crate::engine::{CacheRecord, FileSummary, WalkEvent};
use crate::fmt::{FmtStyle, format_bytes};

/// How byte counts are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportStyle {
    /// Exact byte counts.
    #[default]
    Raw,
    /// Rounded binary units ("1.5M").
    Human,
}

impl ReportStyle {
    fn bytes(&self, bytes: u64) -> String {
        match self {
            ReportStyle::Raw => bytes.to_string(),
            ReportStyle::Human => format_bytes(bytes, FmtStyle::Compact),
        }
    }
}

/// Fixed-capacity text buffer.
#[derive(Debug, Clone)]
pub struct BoundedSink {
    buf: String,
    capacity: usize,
    overflowed: bool,
}

impl BoundedSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            capacity,
            overflowed: false,
        }
    }

    /// Appends one line (a trailing newline is added). Returns false when
    /// the line was dropped.
    pub fn line(&mut self, args: fmt::Arguments<'_>) -> bool {
        if self.overflowed {
            return false;
        }
        let mut line = fmt::format(args);
        line.push('\n');
        if self.buf.len() + line.len() > self.capacity {
            self.overflowed = true;
            return false;
        }
        self.buf.push_str(&line);
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Renders drained index records, one `[identity] bytes` line each.
pub fn write_records<I>(sink: &mut BoundedSink, records: I, style: ReportStyle)
where
    I: IntoIterator<Item = CacheRecord>,
{
    for record in records {
        if !sink.line(format_args!("[{}] {}", record.identity, style.bytes(record.cached_bytes))) {
            break;
        }
    }
}

/// Renders a walk: filesystem and device headers followed by one line per object.
pub fn write_walk<I>(sink: &mut BoundedSink, events: I, style: ReportStyle)
where
    I: IntoIterator<Item = WalkEvent>,
{
    for event in events {
        let written = match event {
            WalkEvent::Filesystem(name) => sink.line(format_args!("Filesystem: {}", name)),
            WalkEvent::Device {
                device,
                mount_point,
            } => sink.line(format_args!("Device: {} on {}", device, mount_point)),
            WalkEvent::Object(summary) => sink.line(format_args!("{}", summary_line(&summary, style))),
        };
        if !written {
            break;
        }
    }
}

fn summary_line(summary: &FileSummary, style: ReportStyle) -> String {
    let stats = format!(
        "[{}] {}% {}/{}",
        summary.identity,
        summary.percent_resident(),
        style.bytes(summary.resident_bytes),
        style.bytes(summary.total_bytes)
    );
    match &summary.name {
        Some(name) => format!("{} {}", name, stats),
        None => stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{DeviceId, FileIdentity};

    fn record(ino: u64, bytes: u64) -> CacheRecord {
        CacheRecord {
            identity: FileIdentity::new(DeviceId::new(8, 1), ino),
            cached_bytes: bytes,
        }
    }

    #[test]
    fn test_records_render_one_per_line() {
        let mut sink = BoundedSink::new(4096);
        write_records(&mut sink, vec![record(12, 8192), record(13, 4096)], ReportStyle::Raw);
        assert_eq!(sink.as_str(), "[8:1/12] 8192\n[8:1/13] 4096\n");
        assert!(!sink.overflowed());
    }

    #[test]
    fn test_human_style() {
        let mut sink = BoundedSink::new(4096);
        write_records(&mut sink, vec![record(12, 3 * 1024 * 1024 / 2)], ReportStyle::Human);
        assert_eq!(sink.as_str(), "[8:1/12] 1.5M\n");
    }

    #[test]
    fn test_empty_records_render_empty_body() {
        let mut sink = BoundedSink::new(16);
        write_records(&mut sink, Vec::new(), ReportStyle::Raw);
        assert!(sink.is_empty());
        assert!(!sink.overflowed());
    }

    #[test]
    fn test_walk_rendering() {
        let identity = FileIdentity::new(DeviceId::new(8, 1), 12);
        let events = vec![
            WalkEvent::Filesystem("ext4".into()),
            WalkEvent::Device {
                device: DeviceId::new(8, 1),
                mount_point: "/".into(),
            },
            WalkEvent::Object(FileSummary {
                identity,
                name: None,
                resident_bytes: 512 * 1024,
                total_bytes: 1024 * 1024,
            }),
            WalkEvent::Object(FileSummary {
                identity,
                name: Some("var/log/syslog".into()),
                resident_bytes: 0,
                total_bytes: 0,
            }),
        ];
        let mut sink = BoundedSink::new(4096);
        write_walk(&mut sink, events, ReportStyle::Raw);
        assert_eq!(
            sink.as_str(),
            "Filesystem: ext4\n\
             Device: 8:1 on /\n\
             [8:1/12] 50% 524288/1048576\n\
             var/log/syslog [8:1/12] 0% 0/0\n"
        );
    }

    #[test]
    fn test_overflow_drops_whole_lines() {
        let mut sink = BoundedSink::new(15);
        write_records(&mut sink, vec![record(1, 1), record(2, 2), record(3, 3)], ReportStyle::Raw);
        assert!(sink.overflowed());
        assert_eq!(sink.as_str(), "[8:1/1] 1\n");
        assert!(!sink.line(format_args!("x")));
    }
}
