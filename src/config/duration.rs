//! Duration parsing utilities.

use anyhow::Context;
use std::time::Duration;

/// Parse a duration string like "1h", "30m", "300s" or "300" (seconds).
///
/// Zero is rejected: neither a request timeout nor a schedule interval can
/// be empty.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (digits, unit_secs, unit) = if let Some(num_str) = s.strip_suffix('h') {
        (num_str, 3600, "hours")
    } else if let Some(num_str) = s.strip_suffix('m') {
        (num_str, 60, "minutes")
    } else if let Some(num_str) = s.strip_suffix('s') {
        (num_str, 1, "seconds")
    } else {
        (s, 1, "seconds")
    };

    let value: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("Invalid {unit} value in duration: {s}"))?;
    let secs = value
        .checked_mul(unit_secs)
        .with_context(|| format!("Duration out of range: {s}"))?;
    if secs == 0 {
        anyhow::bail!("Duration must be greater than zero: {s}");
    }
    Ok(Duration::from_secs(secs))
}
