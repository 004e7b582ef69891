//! Human readable byte sizes.
//!
//! Sizes accept an optional unit suffix. Every unit is a binary multiple:
//! `k`, `kb` and `kib` all mean 1024 bytes. Fractional values are allowed and
//! truncated toward zero once multiplied, so `1.5k` is 1536 bytes.

use crate::error::{Error, Result};

const UNITS: [(&str, u64); 14] = [
    ("", 1),
    ("b", 1),
    ("k", 1 << 10),
    ("kb", 1 << 10),
    ("kib", 1 << 10),
    ("m", 1 << 20),
    ("mb", 1 << 20),
    ("mib", 1 << 20),
    ("g", 1 << 30),
    ("gb", 1 << 30),
    ("gib", 1 << 30),
    ("t", 1 << 40),
    ("tb", 1 << 40),
    ("tib", 1 << 40),
];

fn multiplier(unit: &str) -> Option<u64> {
    UNITS.iter().find(|(u, _)| *u == unit).map(|(_, m)| *m)
}

/// Parse sizes such as `8m`, `8MB`, `8MiB`, `512k`, `1.5g` or `1048576`.
///
/// ```rust
/// use fastget::utils::parse_size;
///
/// assert_eq!(parse_size("8MB").unwrap(), 8 * 1024 * 1024);
/// assert_eq!(parse_size("1.5k").unwrap(), 1536);
/// ```
pub fn parse_size(input: &str) -> Result<u64> {
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let unit = unit.trim().to_ascii_lowercase();

    let valid_number = match number.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => !number.is_empty(),
    };
    if !valid_number {
        return Err(Error::InvalidConfig(format!("invalid size: {input:?}")));
    }

    let mul = multiplier(&unit)
        .ok_or_else(|| Error::InvalidConfig(format!("unknown size unit: {unit:?}")))?;

    match number.split_once('.') {
        None => number
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(mul))
            .ok_or_else(|| Error::InvalidConfig(format!("size out of range: {input:?}"))),
        Some(_) => {
            let value = number
                .parse::<f64>()
                .map_err(|_| Error::InvalidConfig(format!("invalid size: {input:?}")))?;
            let bytes = (value * mul as f64).trunc();
            if bytes >= u64::MAX as f64 {
                return Err(Error::InvalidConfig(format!("size out of range: {input:?}")));
            }
            Ok(bytes as u64)
        }
    }
}

/// Render a byte count with two decimals and a binary unit.
pub fn format_bytes(bytes: u64) -> String {
    const NAMES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < NAMES.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", NAMES[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size(" 7 ").unwrap(), 7);
        assert_eq!(parse_size("7b").unwrap(), 7);
    }

    #[test]
    fn test_units_are_binary() {
        assert_eq!(parse_size("8m").unwrap(), 8 << 20);
        assert_eq!(parse_size("8MB").unwrap(), 8 << 20);
        assert_eq!(parse_size("8MiB").unwrap(), 8 << 20);
        assert_eq!(parse_size("512k").unwrap(), 512 << 10);
        assert_eq!(parse_size("2 g").unwrap(), 2 << 30);
        assert_eq!(parse_size("1TiB").unwrap(), 1 << 40);
    }

    #[test]
    fn test_fraction_truncates() {
        assert_eq!(parse_size("1.5g").unwrap(), 3 << 29);
        assert_eq!(parse_size("0.3k").unwrap(), 307);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("mb").is_err());
        assert!(parse_size("8x").is_err());
        assert!(parse_size("1.").is_err());
        assert!(parse_size("-5").is_err());
        assert!(parse_size("99999999999t").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(8 << 20), "8.00 MB");
    }
}
