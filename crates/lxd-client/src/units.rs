//! Size strings as LXD stores them (`"40GB"`, `"80GiB"`, `"1073741824"`)

/// Bytes in one GiB
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Parse an LXD size string into bytes.
///
/// Decimal (`kB`, `MB`, `GB`, `TB`, `PB`) and binary (`KiB` .. `PiB`) suffixes
/// are accepted, case-insensitively, with an optional trailing `B`. A bare
/// number is bytes. Returns `None` for anything else.
pub fn parse_size(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    let multiplier: f64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "k" | "kb" => 1e3,
        "m" | "mb" => 1e6,
        "g" | "gb" => 1e9,
        "t" | "tb" => 1e12,
        "p" | "pb" => 1e15,
        "ki" | "kib" => 1024.0,
        "mi" | "mib" => 1024.0_f64.powi(2),
        "gi" | "gib" => 1024.0_f64.powi(3),
        "ti" | "tib" => 1024.0_f64.powi(4),
        "pi" | "pib" => 1024.0_f64.powi(5),
        _ => return None,
    };
    to_bytes(value * multiplier)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "range checked before the cast"
)]
fn to_bytes(raw: f64) -> Option<u64> {
    let bytes = raw.round();
    if !bytes.is_finite() || bytes < 0.0 || bytes >= 2.0_f64.powi(64) {
        return None;
    }
    Some(bytes as u64)
}

/// Render a whole number of GiB the way the provisioner writes sizes
pub fn format_gib(gib: u64) -> String {
    format!("{}GiB", gib)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_and_decimal() {
        assert_eq!(parse_size("80GiB"), Some(80 * GIB));
        assert_eq!(parse_size("40GB"), Some(40_000_000_000));
        assert_eq!(parse_size("1.5GiB"), Some(GIB + GIB / 2));
        assert_eq!(parse_size("512MiB"), Some(512 * 1024 * 1024));
        assert_eq!(parse_size("1073741824"), Some(GIB));
        assert_eq!(parse_size(" 10gib "), Some(10 * GIB));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("GiB"), None);
        assert_eq!(parse_size("10 parsecs"), None);
        assert_eq!(parse_size("99999999999PiB"), None);
    }

    #[test]
    fn test_format_round_trips() {
        assert_eq!(parse_size(&format_gib(45)), Some(45 * GIB));
    }
}
