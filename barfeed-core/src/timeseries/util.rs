/// 1970-01-05T00:00Z, the first Monday after the epoch. Weekly bars start here.
pub const WEEK_ORIGIN_MS: i64 = 4 * 86_400_000;

/// Floor `ts_ms` to a multiple of `step_ms` (epoch-aligned, also for negatives).
///
/// Results that would leave the `i64` range saturate.
#[must_use]
pub const fn align_down(ts_ms: i64, step_ms: i64) -> i64 {
    ts_ms.saturating_sub(ts_ms.rem_euclid(step_ms))
}

/// Ceil `ts_ms` to a multiple of `step_ms`.
#[must_use]
pub const fn align_up(ts_ms: i64, step_ms: i64) -> i64 {
    let floor = align_down(ts_ms, step_ms);
    if floor == ts_ms {
        floor
    } else {
        floor.saturating_add(step_ms)
    }
}

/// Floor `ts_ms` to the grid `origin_ms + k * step_ms`.
#[must_use]
pub const fn align_down_from(ts_ms: i64, step_ms: i64, origin_ms: i64) -> i64 {
    align_down(ts_ms.saturating_sub(origin_ms), step_ms).saturating_add(origin_ms)
}

/// Ceil `ts_ms` to the grid `origin_ms + k * step_ms`.
#[must_use]
pub const fn align_up_from(ts_ms: i64, step_ms: i64, origin_ms: i64) -> i64 {
    align_up(ts_ms.saturating_sub(origin_ms), step_ms).saturating_add(origin_ms)
}
