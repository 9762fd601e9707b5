//! Configuration types shared by the replay and live providers.

use serde::{Deserialize, Serialize};

use crate::range::TimeRange;

/// Thresholds for deciding whether the last bar of a live push is final.
///
/// The defaults were tuned against exchanges that push every few seconds;
/// treat them as tunables rather than universal constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Push intervals at or below this many seconds count as a "fast" stream.
    pub fast_push_secs: i64,
    /// A fast stream only defers certification for timeframes at least this long.
    pub min_timeframe_secs: i64,
    /// Fraction of the push interval within which an unclosed bar is treated as closed.
    pub close_slack_ratio: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            fast_push_secs: 5,
            min_timeframe_secs: 60,
            close_slack_ratio: 0.5,
        }
    }
}

/// Exponential backoff configuration for reconnecting the live transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor to increase delay after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 500,
            max_backoff_ms: 30_000,
            factor: 2,
            jitter_percent: 20,
        }
    }
}

/// Global configuration for a feed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Exchange identifier; live messages for other exchanges are dropped.
    pub exchange: String,
    /// Market identifier (e.g. "spot", "linear"); same filtering as `exchange`.
    pub market: String,
    /// Number of warm-up workers running in parallel. Zero is treated as one.
    pub concurrency: usize,
    /// Replay window. Required for historical replay, ignored by live feeds.
    pub time_range: Option<TimeRange>,
    /// Live bar-completion thresholds.
    pub completion: CompletionConfig,
    /// Buffer size of the scheduler control channel.
    ///
    /// A full buffer on `mark_dirty` is reported as an error instead of blocking.
    pub control_capacity: usize,
    /// Number of bars a historical feeder reads per storage query.
    pub fetch_batch: usize,
    /// Instruments additionally watched for order-book data on live feeds.
    pub book_symbols: Vec<String>,
    /// Capacity of the inbound live frame queue.
    pub frame_buffer: usize,
    /// Optional reconnect policy for the live transport.
    pub backoff: Option<BackoffConfig>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            exchange: String::new(),
            market: String::new(),
            concurrency: 2,
            time_range: None,
            completion: CompletionConfig::default(),
            control_capacity: 5,
            fetch_batch: 500,
            book_symbols: Vec::new(),
            frame_buffer: 1024,
            backoff: None,
        }
    }
}

impl FeedConfig {
    /// Warm-up worker count, never below one.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Topic carrying last-price updates for the configured exchange and market.
    #[must_use]
    pub fn price_topic(&self) -> String {
        format!("price_{}_{}", self.exchange, self.market)
    }
}
