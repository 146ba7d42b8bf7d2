//! Size literals: parsing `64K`-style arguments and pretty-printing byte counts.

use crate::error::{CtlError, Result};

const SUFFIXES: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Parse a size literal: decimal digits with an optional single binary
/// magnitude suffix (`k`, `m`, `g`, `t`, `p`, `e`; case-insensitive).
pub fn parse_size(literal: &str) -> Result<u64> {
    let invalid = || CtlError::Parse(format!("invalid size: {:?}", literal));

    let trimmed = literal.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let shift = match suffix.to_ascii_lowercase().as_str() {
        "" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        "p" => 50,
        "e" => 60,
        _ => return Err(invalid()),
    };

    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| CtlError::Parse(format!("size too large: {:?}", literal)))
}

/// Render a byte count the way the filesystem tools do: two decimals and an
/// IEC suffix, e.g. `1.50MiB`, `512.00B`.
pub fn pretty_size(bytes: u64) -> String {
    let mut divs = 0usize;
    let mut whole = bytes;
    while whole >= 1024 && divs + 1 < SUFFIXES.len() {
        whole /= 1024;
        divs += 1;
    }
    let value = bytes as f64 / (1u64 << (10 * divs)) as f64;
    format!("{:.2}{}", value, SUFFIXES[divs])
}
