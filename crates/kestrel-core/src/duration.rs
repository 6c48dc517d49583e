//! Duration-expression parsing.
//!
//! Accepts the short forms used in schedules and query ranges:
//! "500ms", "30s", "5m", "1h", "2d", "1w", or a bare number of seconds.

use std::time::Duration;

/// Parse a duration string like "500ms", "30s", "5m", "1h", "2d", "1w".
///
/// A bare number is treated as seconds. Returns `None` for anything else.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    if let Some(hours) = s.strip_suffix('h') {
        return hours
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600));
    }
    if let Some(days) = s.strip_suffix('d') {
        return days
            .parse::<u64>()
            .ok()
            .map(|d| Duration::from_secs(d * 86_400));
    }
    if let Some(weeks) = s.strip_suffix('w') {
        return weeks
            .parse::<u64>()
            .ok()
            .map(|w| Duration::from_secs(w * 7 * 86_400));
    }
    s.parse::<u64>().ok().map(Duration::from_secs)
}
