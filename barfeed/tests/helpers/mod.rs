// Shared rigs so tests can `use helpers::*;`
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use barfeed::{
    FeedBuilder, FeederFactory, HistProvider, LiveBarFeeder, LiveProvider, StoreFeeder,
    SubscribeRequest,
};
use barfeed_core::{
    Bar, BarSink, Clock, FeedError, HistorySource, ProgressSink, ReplayClock, SharedFeeder,
    Symbol, SymbolResolver, TimeRange, Timeframe,
};
use barfeed_mock::fixtures::sym;
use barfeed_mock::{
    CountingProgress, DynamicTransport, MemoryStore, RecordingSink, StaticResolver,
    TransportController, VecFeeder,
};
use futures::FutureExt;

pub const BTC: &str = "BTC/USDT";
pub const ETH: &str = "ETH/USDT";
pub const SOL: &str = "SOL/USDT";

pub const MIN: i64 = 60_000;
pub const HOUR: i64 = 60 * MIN;

/// 2024-01-01T00:00:00Z, a Monday.
pub const T0: i64 = 1_704_067_200_000;

/// Warm-up counts per timeframe.
pub fn counts(pairs: &[(Timeframe, usize)]) -> BTreeMap<Timeframe, usize> {
    pairs.iter().copied().collect()
}

/// Subscribe request with the same counts for every symbol.
pub fn request(symbols: &[&str], pairs: &[(Timeframe, usize)]) -> SubscribeRequest {
    symbols.iter().map(|s| (sym(s), counts(pairs))).collect()
}

pub fn range(start_ms: i64, end_ms: i64) -> TimeRange {
    TimeRange::new(start_ms, end_ms).unwrap()
}

/// Wrap a vector of feeders for `run_hist_feeders`.
pub fn shared_all(feeders: Vec<VecFeeder>) -> Vec<SharedFeeder<VecFeeder>> {
    feeders.into_iter().map(VecFeeder::shared).collect()
}

/// Factory creating [`VecFeeder`]s from a fixed table of bars.
pub fn vec_factory(table: HashMap<Symbol, Vec<Bar>>, sink: Arc<RecordingSink>) -> FeederFactory<VecFeeder> {
    let table = Arc::new(table);
    Arc::new(move |symbol: Symbol, tfs: Vec<Timeframe>| {
        let bars = table.get(&symbol).cloned();
        let sink: Arc<dyn BarSink> = sink.clone();
        async move {
            let bars = bars.ok_or_else(|| FeedError::not_found(format!("bars for {symbol}")))?;
            Ok::<SharedFeeder<VecFeeder>, FeedError>(VecFeeder::new(symbol, &tfs, bars, sink).shared())
        }
        .boxed()
    })
}

/// Replay provider over a memory store.
pub struct HistRig {
    pub provider: HistProvider<StoreFeeder>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub progress: Arc<CountingProgress>,
}

pub fn hist_rig(store: MemoryStore, sink: RecordingSink, window: TimeRange) -> HistRig {
    let store = Arc::new(store);
    let sink = Arc::new(sink);
    let progress = Arc::new(CountingProgress::new());
    let resolver: Arc<dyn SymbolResolver> = Arc::new(StaticResolver::new());
    let history: Arc<dyn HistorySource> = store.clone();
    let bar_sink: Arc<dyn BarSink> = sink.clone();
    let progress_sink: Arc<dyn ProgressSink> = progress.clone();
    let provider = FeedBuilder::new()
        .venue("mock", "spot")
        .time_range(window)
        .with_resolver(resolver)
        .with_history(history)
        .with_sink(bar_sink)
        .with_progress(progress_sink)
        .build_hist()
        .unwrap();
    HistRig {
        provider,
        store,
        sink,
        progress,
    }
}

/// Live provider over a scripted transport and a manual clock.
pub struct LiveRig {
    pub provider: Arc<LiveProvider<LiveBarFeeder>>,
    pub ctrl: TransportController,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ReplayClock>,
    pub store: Arc<MemoryStore>,
}

pub async fn live_rig(builder: FeedBuilder, now_ms: i64) -> LiveRig {
    let (transport, ctrl) = DynamicTransport::new_with_controller("mem://live");
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ReplayClock::new(now_ms));
    let store = Arc::new(MemoryStore::new().without_download());
    let resolver: Arc<dyn SymbolResolver> = Arc::new(StaticResolver::new());
    let history: Arc<dyn HistorySource> = store.clone();
    let bar_sink: Arc<dyn BarSink> = sink.clone();
    let as_clock: Arc<dyn Clock> = clock.clone();
    let provider = builder
        .with_resolver(resolver)
        .with_history(history)
        .with_transport(transport)
        .with_sink(bar_sink)
        .with_clock(as_clock)
        .build_live()
        .await
        .unwrap();
    LiveRig {
        provider,
        ctrl,
        sink,
        clock,
        store,
    }
}

/// Timestamps of `bars`.
pub fn stamps(bars: &[Bar]) -> Vec<i64> {
    bars.iter().map(|b| b.ts).collect()
}

/// Poll `cond` every few milliseconds until it holds; false after `timeout`.
pub async fn wait_for(mut cond: impl FnMut() -> bool, timeout: std::time::Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    cond()
}

/// Bar update for `symbol` on the `mock`/`spot` venue.
pub fn ohlcv(symbol: &str, tf_secs: i64, interval_secs: i64, bars: Vec<Bar>) -> barfeed_core::Inbound {
    barfeed_core::Inbound::Ohlcv(barfeed_core::LiveMessage {
        exchange: "mock".into(),
        market: "spot".into(),
        instrument: symbol.into(),
        timeframe_seconds: tf_secs,
        push_interval_seconds: interval_secs,
        bars,
    })
}
