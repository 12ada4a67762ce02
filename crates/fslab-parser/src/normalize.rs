use crate::outcome::Outcome;

/// Default floor for timing attributes, in seconds.
pub const MIN_TIME: f64 = 0.01;

/// Raises non-positive `search_time` and `total_time` to `min_time`.
///
/// Only those two timings are touched. Counts, flags, `error` and `coverage`
/// are left alone, and a second pass is a no-op.
pub fn normalize_timings(outcome: &mut Outcome, min_time: f64) {
    let Some(usage) = outcome.usage_mut() else {
        return;
    };
    for time in [&mut usage.search_time, &mut usage.total_time] {
        if let Some(t) = time {
            if *t <= 0.0 {
                *t = min_time;
            }
        }
    }
}
