//! Shared formatting helpers.

/// Controls compact (report columns) vs verbose (log lines) output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmtStyle {
    /// Compact: no spaces, short suffixes ("1.5G", "512B")
    Compact,
    /// Detail: spaces, full suffixes ("1.5 GiB", "512 B")
    Detail,
}

/// Format byte count as human-readable size.
///
/// Compact: `"1.5G"`, `"100.3M"`, `"50.0K"`, `"512B"`
/// Detail:  `"1.5 GiB"`, `"100.3 MiB"`, `"50.0 KiB"`, `"512 B"`
pub fn format_bytes(bytes: u64, style: FmtStyle) -> String {
    let (t, g, m, k, b) = match style {
        FmtStyle::Compact => ("T", "G", "M", "K", "B"),
        FmtStyle::Detail => (" TiB", " GiB", " MiB", " KiB", " B"),
    };
    const KIB: u64 = 1024;
    let f = bytes as f64;
    if bytes >= KIB.pow(4) {
        format!("{:.1}{}", f / KIB.pow(4) as f64, t)
    } else if bytes >= KIB.pow(3) {
        format!("{:.1}{}", f / KIB.pow(3) as f64, g)
    } else if bytes >= KIB.pow(2) {
        format!("{:.1}{}", f / KIB.pow(2) as f64, m)
    } else if bytes >= KIB {
        format!("{:.1}{}", f / KIB as f64, k)
    } else {
        format!("{}{}", bytes, b)
    }
}
