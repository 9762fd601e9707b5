//! Historical replay: merge order, scheduler loop and the replay provider.

mod order;
mod scheduler;

pub use order::{Entry, FeederKey, insert_sorted, sort_all};
pub use scheduler::{ReplayContext, run_hist_feeders};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use barfeed_core::{
    BarSink, Capability, Clock, FeedConfig, FeedError, HistFeeder, HistorySource, ProgressPhase,
    ProgressSink, ReplayClock, SharedFeeder, Symbol, SymbolResolver, TimeRange, Timeframe,
};
use futures::FutureExt;

use crate::feeder::StoreFeeder;
use crate::provider::{FeederFactory, Provider, SubscribeOutcome, SubscribeRequest};

/// Replay provider: subscriptions, gap download and the replay loop.
pub struct HistProvider<F: ?Sized> {
    provider: Provider<F>,
    source: Arc<dyn HistorySource>,
    clock: Arc<ReplayClock>,
    progress: Arc<dyn ProgressSink>,
    range: TimeRange,
    workers: usize,
    running: AtomicBool,
}

impl<F> HistProvider<F>
where
    F: HistFeeder + ?Sized + 'static,
{
    /// Create a provider replaying `cfg.time_range`.
    ///
    /// # Errors
    /// `InvalidArg` when no time range is configured.
    pub fn new(
        factory: FeederFactory<F>,
        cfg: &FeedConfig,
        source: Arc<dyn HistorySource>,
        clock: Arc<ReplayClock>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, FeedError> {
        let range = cfg
            .time_range
            .ok_or_else(|| FeedError::InvalidArg("replay requires a time range".into()))?;
        let as_clock: Arc<dyn Clock> = clock.clone();
        Ok(Self {
            provider: Provider::new(factory, cfg, as_clock, Arc::clone(&progress)),
            source,
            clock,
            progress,
            range,
            workers: cfg.workers(),
            running: AtomicBool::new(false),
        })
    }

    /// Subscribe, download missing history and position every resumed feeder.
    ///
    /// Feeders that were never positioned, or whose cursor differs from the
    /// resume point, are moved to it; the replay clock then advances to the
    /// latest resume point. While the loop runs, a structural change is
    /// announced to it.
    ///
    /// # Errors
    /// Subscription, warm-up, download or repositioning errors.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "barfeed::hist::subscribe", skip(self, request), fields(symbols = request.len()))
    )]
    pub async fn subscribe(
        &self,
        request: &SubscribeRequest,
        drop_others: bool,
    ) -> Result<SubscribeOutcome, FeedError> {
        let out = self.provider.subscribe(request, drop_others).await?;
        if let Err(e) = self.position(&out).await {
            self.discard_unpositioned(&out.new_feeders).await;
            return Err(e);
        }
        if out.changed && self.is_running() {
            self.provider.mark_dirty()?;
        }
        Ok(out)
    }

    async fn position(&self, out: &SubscribeOutcome) -> Result<(), FeedError> {
        self.download_if_needed().await?;

        let mut max_since = None;
        for (key, &since) in &out.since {
            let Some(feeder) = self.provider.get(&key.symbol) else {
                continue;
            };
            let mut feeder = feeder.lock().await;
            let cursor = feeder.states().first().map(|s| s.next_ms);
            if feeder.next_due_ms() == 0 || cursor != Some(since) {
                feeder.set_cursor(since).await?;
            }
            max_since = max_since.max(Some(since));
        }
        if let Some(ts) = max_since {
            self.clock.advance_to(ts);
        }
        Ok(())
    }

    /// Drop feeders among `symbols` that never got a cursor, so a later
    /// subscribe creates and warms them from scratch.
    async fn discard_unpositioned(&self, symbols: &[Symbol]) {
        let mut stale = Vec::new();
        for symbol in symbols {
            let Some(feeder) = self.provider.get(symbol) else {
                continue;
            };
            let unset = feeder
                .lock()
                .await
                .states()
                .first()
                .is_none_or(|s| s.next_ms == 0);
            if unset {
                stale.push(symbol.clone());
            }
        }
        if !stale.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!(target: "barfeed::hist", feeders = stale.len(), "dropping feeders left without a cursor");
            self.provider.unsubscribe(&stale).await;
        }
    }

    /// Remove feeders; a running loop is told to rebuild its merge order.
    ///
    /// # Errors
    /// `ControlChannel` if the running loop cannot be notified.
    pub async fn unsubscribe(&self, symbols: &[Symbol]) -> Result<Vec<Symbol>, FeedError> {
        let removed = self.provider.unsubscribe(symbols).await;
        if !removed.is_empty() && self.is_running() {
            self.provider.mark_dirty()?;
        }
        Ok(removed)
    }

    /// Ask the source to fill storage gaps for every held feeder, one at a time.
    ///
    /// Skipped when the source cannot download.
    ///
    /// # Errors
    /// The first download error.
    pub async fn download_if_needed(&self) -> Result<(), FeedError> {
        let Some(downloader) = self.source.as_downloader() else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "barfeed::download",
                source = self.source.name(),
                capability = %Capability::DownloadBars,
                "source cannot download, skipping"
            );
            return Ok(());
        };
        let feeders = self.provider.snapshot();
        self.progress
            .start(ProgressPhase::Download, feeders.len() as u64);
        let mut res = Ok(());
        for (_symbol, feeder) in feeders {
            let mut feeder = feeder.lock().await;
            if let Err(e) = feeder
                .download_if_needed(downloader, self.progress.as_ref())
                .await
            {
                #[cfg(feature = "tracing")]
                tracing::error!(target: "barfeed::download", symbol = %_symbol, error = %e, "download failed");
                res = Err(e);
                break;
            }
        }
        self.progress.finish(ProgressPhase::Download);
        res
    }

    /// Run the replay until the data is exhausted or [`terminate`](Self::terminate) is called.
    ///
    /// # Errors
    /// `BadConfig` when nothing is subscribed, `InvalidArg` when a loop is
    /// already running, otherwise the replay's first error.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "barfeed::hist::loop_main", skip(self))
    )]
    pub async fn loop_main(&self) -> Result<(), FeedError> {
        if self.provider.is_empty() {
            return Err(FeedError::BadConfig("no pairs to run".into()));
        }
        let mut control = self
            .provider
            .take_control()
            .ok_or_else(|| FeedError::InvalidArg("replay loop already running".into()))?;
        let total = u64::try_from(self.range.len_secs()).unwrap_or(0);
        self.progress.start(ProgressPhase::Replay, total);
        self.running.store(true, Ordering::Release);
        #[cfg(feature = "tracing")]
        tracing::info!(target: "barfeed::hist", feeders = self.provider.len(), "replay started");

        let ctx = ReplayContext::new(Arc::clone(&self.clock), Arc::clone(&self.progress))
            .with_max_inflight(self.workers);
        let provider = &self.provider;
        let res = run_hist_feeders(
            || provider.snapshot().into_iter().map(|(_, f)| f).collect(),
            &mut control,
            &ctx,
        )
        .await;

        self.running.store(false, Ordering::Release);
        self.provider.restore_control(control);
        self.progress.finish(ProgressPhase::Replay);
        res
    }

    /// Stop a running loop after its current batch.
    ///
    /// # Errors
    /// `ControlChannel` if the signal cannot be queued.
    pub fn terminate(&self) -> Result<(), FeedError> {
        self.provider.terminate()
    }

    /// True while [`loop_main`](Self::loop_main) runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Underlying subscription manager.
    #[must_use]
    pub const fn provider(&self) -> &Provider<F> {
        &self.provider
    }

    /// Replay clock of this session.
    #[must_use]
    pub const fn clock(&self) -> &Arc<ReplayClock> {
        &self.clock
    }

    /// Replay window.
    #[must_use]
    pub const fn range(&self) -> TimeRange {
        self.range
    }
}

/// Factory building [`StoreFeeder`]s that resolve symbols through `resolver`.
#[must_use]
pub fn store_feeder_factory(
    cfg: &FeedConfig,
    resolver: Arc<dyn SymbolResolver>,
    source: Arc<dyn HistorySource>,
    sink: Arc<dyn BarSink>,
) -> Option<FeederFactory<StoreFeeder>> {
    let range = cfg.time_range?;
    let exchange = cfg.exchange.clone();
    let market = cfg.market.clone();
    let batch = cfg.fetch_batch;
    let factory: FeederFactory<StoreFeeder> = Arc::new(move |symbol: Symbol, tfs: Vec<Timeframe>| {
        let resolver = Arc::clone(&resolver);
        let source = Arc::clone(&source);
        let sink = Arc::clone(&sink);
        let exchange = exchange.clone();
        let market = market.clone();
        async move {
            let instrument = resolver.resolve(&exchange, &market, &symbol).await?;
            let feeder = StoreFeeder::new(instrument, &tfs, source, sink, range, batch)?;
            Ok::<SharedFeeder<StoreFeeder>, FeedError>(Arc::new(tokio::sync::Mutex::new(feeder)))
        }
        .boxed()
    });
    Some(factory)
}
