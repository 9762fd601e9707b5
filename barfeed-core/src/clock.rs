use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for warm-up, progress and live completion decisions.
pub trait Clock: Send + Sync {
    /// Current time in UTC milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Simulated clock of one replay session.
///
/// Each backtest owns its own instance, so concurrent sessions in one process
/// do not observe each other's time.
#[derive(Debug, Default)]
pub struct ReplayClock {
    now: AtomicI64,
}

impl ReplayClock {
    /// Start the clock at `start_ms`.
    #[must_use]
    pub const fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Move the clock forward to `ts_ms`; earlier values are ignored.
    ///
    /// Returns the clock value after the call.
    pub fn advance_to(&self, ts_ms: i64) -> i64 {
        let prev = self.now.fetch_max(ts_ms, Ordering::AcqRel);
        prev.max(ts_ms)
    }

    /// Overwrite the clock, also backwards.
    pub fn set_ms(&self, ts_ms: i64) {
        self.now.store(ts_ms, Ordering::Release);
    }
}

impl Clock for ReplayClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
