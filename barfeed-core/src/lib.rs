//! barfeed-core
//!
//! Core types, feeder contracts and collaborator traits shared across the
//! barfeed workspace.
//!
//! - `types`: symbols, timeframes, bars and bar events.
//! - `feeder`: the `Feeder` contract and per-timeframe cursor state.
//! - `source` / `transport` / `sink`: external collaborators (storage,
//!   download, symbol metadata, live push stream, engine callback).
//! - `clock`: wall clock and the per-session replay clock.
//! - `timeseries`: alignment helpers and bar aggregation.
//!
//! Async runtime (Tokio)
//! ---------------------
//! Feeders are shared as `Arc<tokio::sync::Mutex<_>>`, the live transport
//! hands out `tokio::sync::mpsc` receivers and `stream::FeedHandle` wraps a
//! `tokio::task::JoinHandle`. Code using these must run under Tokio 1.x.
#![warn(missing_docs)]

/// Wall clock and replay clock.
pub mod clock;
/// Feeder contracts and timeframe cursor state.
pub mod feeder;
/// Progress reporting.
pub mod progress;
/// Engine callback trait.
pub mod sink;
/// Historical storage, download and symbol metadata traits.
pub mod source;
/// Background task handle utilities.
pub mod stream;
/// Alignment and aggregation helpers.
pub mod timeseries;
/// Live transport trait and wire messages.
pub mod transport;
/// Core data types.
pub mod types;

pub use barfeed_types::{
    BackoffConfig, Capability, CompletionConfig, FeedConfig, FeedError, TimeRange,
};
pub use clock::{Clock, ReplayClock, SystemClock};
pub use feeder::{
    Feeder, HistFeeder, LiveFeeder, SharedFeeder, TfStates, TimeframeState, deliver,
};
pub use progress::{LogProgress, NoProgress, ProgressPhase, ProgressSink};
pub use sink::BarSink;
pub use source::{BarStore, Downloader, HistorySource, SymbolResolver};
pub use stream::FeedHandle;
pub use transport::{Frame, Inbound, LiveMessage, LiveTransport, PriceMessage, WatchJob, WatchKind};
pub use types::{Bar, BarEvent, EXHAUSTED_MS, Instrument, ResumeKey, Symbol, Timeframe};
