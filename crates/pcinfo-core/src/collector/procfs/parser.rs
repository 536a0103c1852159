//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of `/proc/filesystems` and
//! `/proc/[pid]/mountinfo` into structured data. They are designed to be easily
//! testable with string inputs.

use crate::mem::DeviceId;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// One line of `/proc/filesystems`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsTypeEntry {
    pub name: String,
    /// False for types listed with the `nodev` marker.
    pub requires_dev: bool,
}

/// Parses `/proc/filesystems` content.
///
/// Format: an optional `nodev` column followed by the type name.
/// ```text
/// nodev   sysfs
///         ext4
/// ```
pub fn parse_filesystems(content: &str) -> Result<Vec<FsTypeEntry>, ParseError> {
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let entry = match fields.as_slice() {
            [] => continue,
            ["nodev", name] => FsTypeEntry {
                name: name.to_string(),
                requires_dev: false,
            },
            [name] => FsTypeEntry {
                name: name.to_string(),
                requires_dev: true,
            },
            _ => {
                return Err(ParseError::new(format!(
                    "unexpected filesystems line {}: {:?}",
                    lineno + 1,
                    line
                )));
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// One line of `/proc/[pid]/mountinfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount_id: u32,
    pub parent_id: u32,
    pub device: DeviceId,
    /// Root of the mount within the filesystem (differs from `/` for bind mounts).
    pub root: String,
    pub mount_point: String,
    pub fs_type: String,
    pub source: String,
}

/// Parses `/proc/[pid]/mountinfo` content.
///
/// Format (see proc(5)):
/// `id parent major:minor root mount_point options [optional...] - fstype source superopts`
pub fn parse_mountinfo(content: &str) -> Result<Vec<MountEntry>, ParseError> {
    let mut mounts = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        mounts.push(parse_mountinfo_line(line)?);
    }
    Ok(mounts)
}

fn parse_mountinfo_line(line: &str) -> Result<MountEntry, ParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let sep = fields
        .iter()
        .position(|f| *f == "-")
        .ok_or_else(|| ParseError::new("missing '-' separator in mountinfo"))?;
    if sep < 6 || fields.len() < sep + 3 {
        return Err(ParseError::new(format!(
            "not enough fields in mountinfo: got {}",
            fields.len()
        )));
    }

    let parse_u32 = |s: &str, name: &str| -> Result<u32, ParseError> {
        s.parse().map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    let (major, minor) = fields[2]
        .split_once(':')
        .ok_or_else(|| ParseError::new("invalid major:minor"))?;

    Ok(MountEntry {
        mount_id: parse_u32(fields[0], "mount id")?,
        parent_id: parse_u32(fields[1], "parent id")?,
        device: DeviceId::new(parse_u32(major, "major")?, parse_u32(minor, "minor")?),
        root: unescape_octal(fields[3]),
        mount_point: unescape_octal(fields[4]),
        fs_type: fields[sep + 1].to_string(),
        source: unescape_octal(fields[sep + 2]),
    })
}

/// Decodes the `\NNN` escapes the kernel uses for space, tab, newline and backslash.
fn unescape_octal(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).ok();
            if let Some(v) = digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filesystems() {
        let content = "nodev\tsysfs\nnodev\tproc\n\text4\n\txfs\nnodev\ttmpfs\n";
        let entries = parse_filesystems(content).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(
            entries[2],
            FsTypeEntry {
                name: "ext4".into(),
                requires_dev: true
            }
        );
        assert!(!entries[0].requires_dev);
    }

    #[test]
    fn test_parse_filesystems_rejects_garbage() {
        assert!(parse_filesystems("a b c\n").is_err());
        assert!(parse_filesystems("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_mountinfo() {
        let content = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw,errors=remount-ro
23 22 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
40 22 8:1 /srv/data /mnt/my\\040data rw master:1 - ext4 /dev/sda1 rw
";
        let mounts = parse_mountinfo(content).unwrap();
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].device, DeviceId::new(8, 1));
        assert_eq!(mounts[0].mount_point, "/");
        assert_eq!(mounts[0].fs_type, "ext4");
        assert_eq!(mounts[0].source, "/dev/sda1");
        assert_eq!(mounts[1].parent_id, 22);
        assert_eq!(mounts[1].fs_type, "proc");
        assert_eq!(mounts[2].root, "/srv/data");
        assert_eq!(mounts[2].mount_point, "/mnt/my data");
    }

    #[test]
    fn test_parse_mountinfo_without_optional_fields() {
        let mounts = parse_mountinfo("30 22 259:2 / /home rw - xfs /dev/nvme0n1p2 rw\n").unwrap();
        assert_eq!(mounts[0].device, DeviceId::new(259, 2));
        assert_eq!(mounts[0].fs_type, "xfs");
    }

    #[test]
    fn test_parse_mountinfo_errors() {
        assert!(parse_mountinfo("22 1 8:1 / / rw ext4 /dev/sda1 rw\n").is_err());
        assert!(parse_mountinfo("x 1 8:1 / / rw - ext4 /dev/sda1 rw\n").is_err());
        assert!(parse_mountinfo("22 1 81 / / rw - ext4 /dev/sda1 rw\n").is_err());
    }
}
