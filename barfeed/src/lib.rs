//! barfeed feeds candlestick bars to a trading engine.
//!
//! Overview
//! - Replay: many per-instrument cursors merged into one global stream with
//!   non-decreasing timestamps. Bars sharing a timestamp are delivered
//!   concurrently; a barrier separates one timestamp from the next.
//! - Live: pushed bar updates are reconciled into final bars with a
//!   completion heuristic before delivery.
//! - Both modes share one subscription manager (`Provider`) that creates
//!   feeders on demand, warms them up with bounded parallelism and signals
//!   structural changes to the replay loop through a generation counter.
//!
//! Key behaviors and trade-offs
//! - Replay errors are fatal: a failed delivery ends the run at the next
//!   barrier, so backtests never silently skip data.
//! - Live errors are isolated per message: decode failures, unknown
//!   instruments and delivery failures are logged and the stream continues.
//! - Completion thresholds (`CompletionConfig`) trade delivery latency for
//!   the risk of certifying a bar before its last update.
//!
//! Examples
//! Replaying a window from a store:
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::collections::BTreeMap;
//! use barfeed::{FeedBuilder, Symbol, Timeframe, TimeRange};
//!
//! let hist = FeedBuilder::new()
//!     .venue("binance", "spot")
//!     .time_range("20240101-20240201".parse()?)
//!     .with_resolver(resolver)
//!     .with_history(store)
//!     .with_sink(engine)
//!     .build_hist()?;
//!
//! let mut req = BTreeMap::new();
//! req.insert(Symbol::new("BTC/USDT")?, BTreeMap::from([(Timeframe::M1, 300)]));
//! hist.subscribe(&req, false).await?;
//! hist.loop_main().await?;
//! ```
//!
//! Relaying a live stream:
//! ```rust,ignore
//! let live = FeedBuilder::new()
//!     .venue("binance", "spot")
//!     .with_resolver(resolver)
//!     .with_transport(transport)
//!     .with_sink(engine)
//!     .build_live()
//!     .await?;
//! live.subscribe(&req, false).await?;
//! let handle = live.run();
//! // ...
//! handle.stop().await?;
//! ```
#![warn(missing_docs)]

pub(crate) mod core;
/// Scheduler control messages.
pub mod control;
/// Store-backed and live feeder implementations.
pub mod feeder;
pub mod hist;
pub mod live;
/// Subscription manager.
pub mod provider;
mod resolver;
mod util;
/// Warm-up runner.
pub mod warmup;

pub use crate::core::FeedBuilder;
pub use control::{Control, ControlSender};
pub use feeder::{LiveBarFeeder, StoreFeeder};
pub use hist::{HistProvider, ReplayContext, run_hist_feeders, store_feeder_factory};
pub use live::{LiveProvider, live_feeder_factory, reconcile};
pub use provider::{FeederFactory, Provider, SubscribeOutcome, SubscribeRequest};
pub use resolver::CachedResolver;
pub use util::parallel_run;
pub use warmup::{WarmJob, run_warm_jobs};

// Re-export core types for convenience
pub use barfeed_core::{
    BackoffConfig, Bar, BarEvent, BarSink, BarStore, Capability, Clock, CompletionConfig,
    Downloader, EXHAUSTED_MS, FeedConfig, FeedError, FeedHandle, Feeder, HistFeeder,
    HistorySource, Instrument, LiveFeeder, LiveTransport, LogProgress, NoProgress, ProgressPhase,
    ProgressSink, ReplayClock, ResumeKey, SharedFeeder, Symbol, SymbolResolver, SystemClock,
    TimeRange, Timeframe,
};
