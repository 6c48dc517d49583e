//! Aggregation window selection for time-series display.
//!
//! Given a total observation count and a requested range, pick the
//! duration from a fixed ladder whose resulting bucket count is closest
//! to a target of ~100 points. When the raw point count is already at
//! least as close to the target, bucketing is skipped entirely.

use std::time::Duration;

/// The window ladder, smallest to largest.
pub const WINDOWS: [Duration; 10] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(3600),
    Duration::from_secs(3 * 3600),
    Duration::from_secs(6 * 3600),
    Duration::from_secs(12 * 3600),
    Duration::from_secs(24 * 3600),
    Duration::from_secs(7 * 24 * 3600),
];

/// Ideal number of points on a time-series chart.
pub const TARGET_POINTS: f64 = 100.0;

/// Pick the best aggregation window for `total_points` observations over
/// `range`. Returns `None` when the raw points should be displayed
/// without aggregation.
pub fn choose_window(total_points: u64, range: Duration) -> Option<Duration> {
    if total_points == 0 || range.is_zero() {
        return None;
    }

    let mut best: Option<(Duration, f64)> = None;
    for window in WINDOWS {
        let buckets = range.as_secs_f64() / window.as_secs_f64();
        let distance = (buckets - TARGET_POINTS).abs();
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((window, distance));
        }
    }

    let (window, bucketed_distance) = best?;
    let raw_distance = (total_points as f64 - TARGET_POINTS).abs();
    if raw_distance <= bucketed_distance {
        return None;
    }
    Some(window)
}
