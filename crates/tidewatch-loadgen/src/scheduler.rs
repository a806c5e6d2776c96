//! Per-worker rate assignment.

use std::time::Duration;

/// Split `target_rate` across `workers` so the parts sum exactly to the
/// target and differ by at most one. The first `target_rate % workers`
/// workers carry the extra unit.
///
/// Returns an empty vector when `workers` is zero.
pub fn split_rate(target_rate: u32, workers: usize) -> Vec<u32> {
    if workers == 0 {
        return Vec::new();
    }
    let n = workers as u64;
    let base = (u64::from(target_rate) / n) as u32;
    let remainder = (u64::from(target_rate) % n) as usize;
    (0..workers)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Nominal spacing between requests for a worker with `rate` requests per
/// second. `None` for an idle worker.
pub fn tick_interval(rate: u32) -> Option<Duration> {
    if rate == 0 {
        None
    } else {
        Some(Duration::from_secs(1) / rate)
    }
}
