use barfeed_core::BackoffConfig;
use rand::Rng;

/// `base_ms` plus up to `jitter_percent` percent of random extra delay.
pub fn jitter_wait(base_ms: u64, jitter_percent: u32) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, (base_ms.saturating_mul(u64::from(jitter_percent))) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Reconnect delay that grows by `factor` per failure up to the maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    cfg: BackoffConfig,
    current_ms: u64,
}

impl Backoff {
    /// Start at the minimum delay of `cfg`.
    #[must_use]
    pub fn new(cfg: BackoffConfig) -> Self {
        Self {
            current_ms: cfg.min_backoff_ms,
            cfg,
        }
    }

    /// Delay to wait before the next attempt; grows the base for the one after.
    pub fn next_delay_ms(&mut self) -> u64 {
        let wait = jitter_wait(self.current_ms, u32::from(self.cfg.jitter_percent.min(100)));
        self.current_ms = self
            .current_ms
            .saturating_mul(u64::from(self.cfg.factor.max(1)))
            .min(self.cfg.max_backoff_ms.max(self.cfg.min_backoff_ms));
        wait
    }

    /// Back to the minimum after a successful connect.
    pub fn reset(&mut self) {
        self.current_ms = self.cfg.min_backoff_ms;
    }
}
