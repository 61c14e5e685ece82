//! Human-readable size strings as printed by `lsblk` ("447.1G", "600M", "0B").

use crate::error::{DiskmonError, Result};

/// Fixed binary unit table. Suffixes are matched case-insensitively.
const UNITS: [(char, u64); 5] = [
    ('B', 1),
    ('K', 1 << 10),
    ('M', 1 << 20),
    ('G', 1 << 30),
    ('T', 1 << 40),
];

/// Parse a size string into a byte count.
///
/// A bare number is taken as bytes. The mantissa may carry a fraction, using
/// either `.` or `,` as decimal separator (lsblk follows the locale). The
/// result is rounded to the nearest byte.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let last = trimmed
        .chars()
        .last()
        .ok_or_else(|| DiskmonError::Parse("empty size string".to_string()))?;

    let (mantissa, multiplier) = if last.is_ascii_alphabetic() {
        let unit = last.to_ascii_uppercase();
        let multiplier = UNITS
            .iter()
            .find(|(suffix, _)| *suffix == unit)
            .map(|(_, m)| *m)
            .ok_or_else(|| DiskmonError::Parse(format!("unknown size unit '{}' in '{}'", last, input)))?;
        (&trimmed[..trimmed.len() - last.len_utf8()], multiplier)
    } else {
        (trimmed, 1)
    };

    let value: f64 = mantissa
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| DiskmonError::Parse(format!("invalid size '{}'", input)))?;

    if !value.is_finite() || value < 0.0 {
        return Err(DiskmonError::Parse(format!("invalid size '{}'", input)));
    }

    Ok((value * multiplier as f64).round() as u64)
}

/// Format a byte count the way lsblk does: largest unit, one decimal unless integral.
pub fn format_size(bytes: u64) -> String {
    let (suffix, unit) = UNITS
        .iter()
        .rev()
        .find(|(_, m)| bytes >= *m)
        .copied()
        .unwrap_or(UNITS[0]);

    if bytes % unit == 0 {
        return format!("{}{}", bytes / unit, suffix);
    }

    let value = bytes as f64 / unit as f64;
    let rounded = format!("{:.1}", value);
    match rounded.strip_suffix(".0") {
        Some(whole) => format!("{}{}", whole, suffix),
        None => format!("{}{}", rounded, suffix),
    }
}
