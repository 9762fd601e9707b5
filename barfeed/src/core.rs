use std::sync::Arc;
use std::time::Duration;

use barfeed_core::{
    BackoffConfig, BarSink, Clock, CompletionConfig, FeedConfig, FeedError, HistorySource,
    LiveTransport, NoProgress, ProgressSink, ReplayClock, SymbolResolver, SystemClock, TimeRange,
};

use crate::feeder::{LiveBarFeeder, StoreFeeder};
use crate::hist::{HistProvider, store_feeder_factory};
use crate::live::{LiveProvider, live_feeder_factory};
use crate::resolver::CachedResolver;

/// Builder for replay and live providers.
pub struct FeedBuilder {
    cfg: FeedConfig,
    resolver: Option<Arc<dyn SymbolResolver>>,
    history: Option<Arc<dyn HistorySource>>,
    transport: Option<Arc<dyn LiveTransport>>,
    sink: Option<Arc<dyn BarSink>>,
    progress: Arc<dyn ProgressSink>,
    clock: Option<Arc<dyn Clock>>,
    symbol_cache: Option<(u64, Duration)>,
}

impl Default for FeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedBuilder {
    /// Create a new builder with default configuration.
    ///
    /// Behavior and trade-offs:
    /// - Starts without collaborators; replay needs a resolver, a history
    ///   source, a sink and a time range, live needs a resolver, a transport
    ///   and a sink.
    /// - Progress is discarded until [`with_progress`](Self::with_progress) is set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cfg: FeedConfig::default(),
            resolver: None,
            history: None,
            transport: None,
            sink: None,
            progress: Arc::new(NoProgress),
            clock: None,
            symbol_cache: None,
        }
    }

    /// Replace the whole configuration, e.g. one deserialized from a file.
    ///
    /// Behavior and trade-offs:
    /// - Overwrites every value set by earlier setters; call it first.
    #[must_use]
    pub fn with_config(mut self, cfg: FeedConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Exchange and market this session trades.
    ///
    /// Behavior and trade-offs:
    /// - Live messages for any other exchange or market are dropped.
    /// - Also names the price topic, `price_{exchange}_{market}`.
    #[must_use]
    pub fn venue(mut self, exchange: impl Into<String>, market: impl Into<String>) -> Self {
        self.cfg.exchange = exchange.into();
        self.cfg.market = market.into();
        self
    }

    /// Number of feeders warmed up in parallel.
    ///
    /// Behavior and trade-offs:
    /// - Higher values shorten warm-up at the cost of more concurrent store
    ///   queries. Zero is treated as one.
    /// - Also bounds how many same-timestamp deliveries run at once in replay.
    #[must_use]
    pub const fn concurrency(mut self, n: usize) -> Self {
        self.cfg.concurrency = n;
        self
    }

    /// Replay window.
    ///
    /// Behavior and trade-offs:
    /// - Required by [`build_hist`](Self::build_hist); the replay clock starts
    ///   at the window start.
    #[must_use]
    pub const fn time_range(mut self, range: TimeRange) -> Self {
        self.cfg.time_range = Some(range);
        self
    }

    /// Live bar-completion thresholds.
    ///
    /// Behavior and trade-offs:
    /// - A larger slack ratio delivers bars sooner but risks delivering a bar
    ///   whose final update has not arrived yet.
    #[must_use]
    pub const fn completion(mut self, cfg: CompletionConfig) -> Self {
        self.cfg.completion = cfg;
        self
    }

    /// Reconnect policy of the live receive loop.
    ///
    /// Behavior and trade-offs:
    /// - Without one the loop ends when the stream closes.
    /// - Higher jitter spreads reconnects of many sessions but adds variance.
    #[must_use]
    pub const fn backoff(mut self, cfg: BackoffConfig) -> Self {
        self.cfg.backoff = Some(cfg);
        self
    }

    /// Instruments additionally watched for order-book data.
    #[must_use]
    pub fn book_symbols(mut self, symbols: Vec<String>) -> Self {
        self.cfg.book_symbols = symbols;
        self
    }

    /// Symbol metadata lookup used when creating feeders.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn SymbolResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Cache resolved symbols.
    ///
    /// Behavior and trade-offs:
    /// - Saves a metadata lookup per re-subscription of a known symbol.
    /// - Metadata changes are only seen after `ttl` expires.
    #[must_use]
    pub const fn cache_symbols(mut self, max_entries: u64, ttl: Duration) -> Self {
        self.symbol_cache = Some((max_entries, ttl));
        self
    }

    /// Historical bars for replay, and for warm-up in live mode.
    #[must_use]
    pub fn with_history(mut self, source: Arc<dyn HistorySource>) -> Self {
        self.history = Some(source);
        self
    }

    /// Live push transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn LiveTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Engine callback.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn BarSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Progress observer for warm-up, download and replay.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Wall clock for live completion decisions and warm-up.
    ///
    /// Behavior and trade-offs:
    /// - Defaults to the system clock; replay always uses its own replay clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn resolver(&mut self) -> Result<Arc<dyn SymbolResolver>, FeedError> {
        let inner = self.resolver.take().ok_or_else(|| {
            FeedError::InvalidArg("no symbol resolver; set one via with_resolver(...)".into())
        })?;
        let resolver: Arc<dyn SymbolResolver> = match self.symbol_cache {
            Some((max, ttl)) => Arc::new(CachedResolver::new(inner, max, ttl)),
            None => inner,
        };
        Ok(resolver)
    }

    fn sink(&mut self) -> Result<Arc<dyn BarSink>, FeedError> {
        self.sink
            .take()
            .ok_or_else(|| FeedError::InvalidArg("no bar sink; set one via with_sink(...)".into()))
    }

    /// Build a replay provider over [`StoreFeeder`]s.
    ///
    /// # Errors
    /// `InvalidArg` when the resolver, history source, sink or time range is missing.
    pub fn build_hist(mut self) -> Result<HistProvider<StoreFeeder>, FeedError> {
        let resolver = self.resolver()?;
        let sink = self.sink()?;
        let history = self.history.take().ok_or_else(|| {
            FeedError::InvalidArg("no history source; set one via with_history(...)".into())
        })?;
        let range = self.cfg.time_range.ok_or_else(|| {
            FeedError::InvalidArg("replay requires a time range; set one via time_range(...)".into())
        })?;
        let factory = store_feeder_factory(&self.cfg, resolver, Arc::clone(&history), sink)
            .ok_or_else(|| FeedError::InvalidArg("replay requires a time range".into()))?;
        let clock = Arc::new(ReplayClock::new(range.start_ms));
        HistProvider::new(factory, &self.cfg, history, clock, self.progress)
    }

    /// Build a live provider over [`LiveBarFeeder`]s and subscribe its price topic.
    ///
    /// # Errors
    /// `InvalidArg` when the resolver, transport or sink is missing, or the
    /// transport's error subscribing the price topic.
    pub async fn build_live(mut self) -> Result<Arc<LiveProvider<LiveBarFeeder>>, FeedError> {
        let resolver = self.resolver()?;
        let sink = self.sink()?;
        let transport = self.transport.take().ok_or_else(|| {
            FeedError::InvalidArg("no live transport; set one via with_transport(...)".into())
        })?;
        let clock: Arc<dyn Clock> = match self.clock.take() {
            Some(c) => c,
            None => Arc::new(SystemClock),
        };
        let factory = live_feeder_factory(&self.cfg, resolver, self.history.take(), Arc::clone(&sink));
        let provider =
            LiveProvider::new(factory, self.cfg, transport, sink, clock, self.progress).await?;
        Ok(Arc::new(provider))
    }
}
