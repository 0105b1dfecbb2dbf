//! Human-readable durations for command-line options.

use std::time::Duration;

/// Parse a duration such as `3s`, `250ms`, `1m` or `2h`.
///
/// A bare number is interpreted as seconds.
///
/// # Examples
/// ```
/// use agora_logger::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be tried before "m" and "s"
    let (number, unit, millis_per_unit) = if let Some(num) = src.strip_suffix("ms") {
        (num, "milliseconds", 1)
    } else if let Some(num) = src.strip_suffix('h') {
        (num, "hours", 3_600_000)
    } else if let Some(num) = src.strip_suffix('m') {
        (num, "minutes", 60_000)
    } else if let Some(num) = src.strip_suffix('s') {
        (num, "seconds", 1_000)
    } else {
        (src, "duration", 1_000)
    };

    let count: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", unit, number.trim()))?;

    count
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too large: {}", src))
}

/// Like [`parse_duration`] but rejects zero.
pub fn parse_nonzero_duration(src: &str) -> Result<Duration, String> {
    match parse_duration(src)? {
        Duration::ZERO => Err("duration must be greater than zero".to_string()),
        duration => Ok(duration),
    }
}
