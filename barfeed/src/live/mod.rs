//! Live feed: watch-job registration, inbound message handling and reconnects.

mod backoff;
mod reconcile;
mod session;

pub use backoff::{Backoff, jitter_wait};
pub use reconcile::{Push, Reconciled, reconcile};

use std::sync::Arc;

use barfeed_core::{
    BarSink, Clock, FeedConfig, FeedError, FeedHandle, HistorySource, Inbound, LiveFeeder,
    LiveMessage, LiveTransport, ProgressSink, SharedFeeder, Symbol, SymbolResolver, Timeframe,
    WatchJob, WatchKind, deliver,
};
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::feeder::LiveBarFeeder;
use crate::provider::{FeederFactory, Provider, SubscribeOutcome, SubscribeRequest};

/// Live provider relaying a pushed bar stream to feeders.
///
/// Share it behind an `Arc`: [`run`](Self::run) spawns the receive loop on a
/// clone while callers keep changing subscriptions.
pub struct LiveProvider<F: ?Sized> {
    provider: Provider<F>,
    transport: Arc<dyn LiveTransport>,
    sink: Arc<dyn BarSink>,
    clock: Arc<dyn Clock>,
    cfg: FeedConfig,
}

impl<F> LiveProvider<F>
where
    F: LiveFeeder + ?Sized + 'static,
{
    /// Create the provider and subscribe the price topic right away.
    ///
    /// `sink` receives price snapshots; bars go to each feeder's own sink.
    ///
    /// # Errors
    /// The transport's error subscribing the price topic.
    pub async fn new(
        factory: FeederFactory<F>,
        cfg: FeedConfig,
        transport: Arc<dyn LiveTransport>,
        sink: Arc<dyn BarSink>,
        clock: Arc<dyn Clock>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, FeedError> {
        transport.subscribe(&[cfg.price_topic()]).await?;
        Ok(Self {
            provider: Provider::new(factory, &cfg, Arc::clone(&clock), progress),
            transport,
            sink,
            clock,
            cfg,
        })
    }

    /// Subscribe and register new feeders with the transport.
    ///
    /// New feeders are watched from their resume point in their smallest
    /// timeframe; removed ones are unwatched. Order-book jobs for the
    /// configured book symbols are sent alongside new feeders.
    ///
    /// # Errors
    /// Subscription or warm-up errors, or the transport's error.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "barfeed::live::subscribe", skip(self, request), fields(symbols = request.len()))
    )]
    pub async fn subscribe(
        &self,
        request: &SubscribeRequest,
        drop_others: bool,
    ) -> Result<SubscribeOutcome, FeedError> {
        let out = self.provider.subscribe(request, drop_others).await?;
        if !out.new_feeders.is_empty() {
            let jobs: Vec<WatchJob> = out
                .new_feeders
                .iter()
                .filter_map(|symbol| {
                    out.since
                        .iter()
                        .find(|(key, _)| &key.symbol == symbol)
                        .map(|(key, &since)| WatchJob {
                            symbol: symbol.clone(),
                            timeframe: key.timeframe,
                            since: Some(since),
                        })
                })
                .collect();
            self.watch(WatchKind::Ohlcv, &jobs).await?;
            self.watch_books().await?;
        }
        if !out.removed.is_empty() {
            self.unwatch(&out.removed).await?;
        }
        Ok(out)
    }

    /// Remove feeders and stop watching them.
    ///
    /// # Errors
    /// The transport's error unwatching.
    pub async fn unsubscribe(&self, symbols: &[Symbol]) -> Result<Vec<Symbol>, FeedError> {
        let removed = self.provider.unsubscribe(symbols).await;
        if !removed.is_empty() {
            self.unwatch(&removed).await?;
        }
        Ok(removed)
    }

    /// Subscribe the price topic again and re-watch every held feeder from its cursor.
    ///
    /// # Errors
    /// The transport's error.
    pub async fn resubscribe(&self) -> Result<(), FeedError> {
        self.transport.subscribe(&[self.cfg.price_topic()]).await?;
        let mut jobs = Vec::new();
        for (symbol, feeder) in self.provider.snapshot() {
            let feeder = feeder.lock().await;
            if let Some(st) = feeder.states().first() {
                jobs.push(WatchJob {
                    symbol,
                    timeframe: st.timeframe,
                    since: (st.next_ms > 0).then_some(st.next_ms),
                });
            }
        }
        self.watch(WatchKind::Ohlcv, &jobs).await?;
        self.watch_books().await
    }

    async fn watch(&self, kind: WatchKind, jobs: &[WatchJob]) -> Result<(), FeedError> {
        if jobs.is_empty() {
            return Ok(());
        }
        self.transport
            .watch_jobs(&self.cfg.exchange, &self.cfg.market, kind, jobs)
            .await
    }

    async fn watch_books(&self) -> Result<(), FeedError> {
        let jobs = self
            .cfg
            .book_symbols
            .iter()
            .map(|s| {
                Ok(WatchJob {
                    symbol: Symbol::new(s.as_str())?,
                    timeframe: Timeframe::M1,
                    since: None,
                })
            })
            .collect::<Result<Vec<_>, FeedError>>()?;
        self.watch(WatchKind::Book, &jobs).await
    }

    async fn unwatch(&self, symbols: &[Symbol]) -> Result<(), FeedError> {
        self.transport
            .unwatch_jobs(&self.cfg.exchange, &self.cfg.market, WatchKind::Ohlcv, symbols)
            .await
    }

    /// Decode and handle one inbound frame.
    ///
    /// # Errors
    /// `Decode` for malformed frames, otherwise see [`handle_message`](Self::handle_message).
    pub async fn handle_frame(&self, frame: &[u8]) -> Result<(), FeedError> {
        let msg = Inbound::decode(frame)?;
        self.handle_message(&msg).await
    }

    /// Route one decoded message.
    ///
    /// Messages for another exchange or market, or for symbols without a
    /// feeder, are dropped.
    ///
    /// # Errors
    /// Feeder or delivery errors for the message's bars, or the sink's error
    /// for prices.
    pub async fn handle_message(&self, msg: &Inbound) -> Result<(), FeedError> {
        let (exchange, market) = msg.venue();
        if exchange != self.cfg.exchange || market != self.cfg.market {
            #[cfg(feature = "tracing")]
            tracing::debug!(target: "barfeed::live", exchange, market, "dropping message for another venue");
            return Ok(());
        }
        match msg {
            Inbound::Price(p) => self.sink.on_prices(&p.prices).await,
            Inbound::Ohlcv(m) => self.handle_bars(m).await,
        }
    }

    async fn handle_bars(&self, msg: &LiveMessage) -> Result<(), FeedError> {
        let Some(feeder) = Symbol::new(msg.instrument.as_str())
            .ok()
            .and_then(|s| self.provider.get(&s))
        else {
            #[cfg(feature = "tracing")]
            tracing::debug!(target: "barfeed::live", instrument = %msg.instrument, "no feeder, dropping bars");
            return Ok(());
        };
        msg.validate()?;
        let tf = msg.timeframe()?;
        let (events, sink) = {
            let mut feeder = feeder.lock().await;
            let feeder_tf_secs = feeder.states().first().map_or(0, |s| s.tf_secs());
            let out = reconcile(
                Push {
                    bars: &msg.bars,
                    tf_secs: tf.secs(),
                    interval_secs: msg.push_interval_seconds,
                },
                feeder_tf_secs,
                feeder.pending_bar().copied(),
                self.clock.now_ms(),
                &self.cfg.completion,
            );
            feeder.set_pending_bar(out.pending);
            (feeder.on_new_bars(tf.ms(), &out.complete)?, feeder.sink())
        };
        deliver(sink.as_ref(), &events).await
    }

    /// Start the receive loop; the returned handle stops it.
    ///
    /// Frames are queued on a bounded channel and handled on their own task.
    /// When the stream ends and a reconnect policy is configured, the loop
    /// reconnects with backoff and calls [`resubscribe`](Self::resubscribe).
    #[must_use]
    pub fn run(self: &Arc<Self>) -> FeedHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let me = Arc::clone(self);
        let join = tokio::spawn(async move { session::run(me, stop_rx).await });
        FeedHandle::new(join, stop_tx)
    }

    /// Underlying subscription manager.
    #[must_use]
    pub const fn provider(&self) -> &Provider<F> {
        &self.provider
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &FeedConfig {
        &self.cfg
    }

    /// Transport in use.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn LiveTransport> {
        &self.transport
    }
}

/// Factory building [`LiveBarFeeder`]s that resolve symbols through `resolver`.
///
/// `history`, when given, serves warm-up bars.
#[must_use]
pub fn live_feeder_factory(
    cfg: &FeedConfig,
    resolver: Arc<dyn SymbolResolver>,
    history: Option<Arc<dyn HistorySource>>,
    sink: Arc<dyn BarSink>,
) -> FeederFactory<LiveBarFeeder> {
    let exchange = cfg.exchange.clone();
    let market = cfg.market.clone();
    Arc::new(move |symbol: Symbol, tfs: Vec<Timeframe>| {
        let resolver = Arc::clone(&resolver);
        let history = history.clone();
        let sink = Arc::clone(&sink);
        let exchange = exchange.clone();
        let market = market.clone();
        async move {
            let instrument = resolver.resolve(&exchange, &market, &symbol).await?;
            let feeder = LiveBarFeeder::new(instrument, &tfs, history, sink)?;
            Ok::<SharedFeeder<LiveBarFeeder>, FeedError>(Arc::new(tokio::sync::Mutex::new(feeder)))
        }
        .boxed()
    })
}
