//! Compact duration strings for SLO documents
//!
//! Windows and intervals travel on the wire as strings like `30s`, `5m`,
//! `1h`, `30d`. Decimals, signs and whitespace are rejected.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(s|m|h|d)$").expect("duration pattern"));

/// Error for malformed duration strings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration format: {0}")]
pub struct InvalidDuration(pub String);

/// Parse a duration string like `5m`, `1h` or `30d`
pub fn parse_duration(s: &str) -> Result<Duration, InvalidDuration> {
    let captures = DURATION_PATTERN
        .captures(s)
        .ok_or_else(|| InvalidDuration(s.to_string()))?;

    let value: u64 = captures[1]
        .parse()
        .map_err(|_| InvalidDuration(s.to_string()))?;

    let seconds = match &captures[2] {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return Err(InvalidDuration(s.to_string())),
    };

    Ok(Duration::from_secs(seconds))
}

/// Format a duration back into the compact string form
///
/// Picks the largest unit that divides the value exactly, falling through
/// to seconds.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
