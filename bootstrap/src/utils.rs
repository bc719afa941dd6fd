use std::time::Duration;

/// Estimate the time remaining for a task that has completed `progress` of `total` units of
/// work in `elapsed`, assuming a constant rate.
///
/// The estimate is rounded to the nearest second. Returns `None` if no progress has been made
/// (the rate is unknown).
pub fn estimate_eta(elapsed: Duration, progress: u64, total: u64) -> Option<Duration> {
    if progress == 0 {
        return None;
    }
    if progress >= total {
        return Some(Duration::ZERO);
    }
    let estimated = elapsed.as_secs_f64() * total as f64 / progress as f64;
    let remaining = (estimated - elapsed.as_secs_f64()).max(0.0);
    Some(Duration::from_secs(remaining.round() as u64))
}
