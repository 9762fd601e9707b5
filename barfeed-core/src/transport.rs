//! Live push transport and its wire messages.

use core::fmt;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::FeedError;
use crate::types::{Bar, Symbol, Timeframe};

/// One inbound frame, or a receive-side failure reported by the transport.
pub type Frame = Result<Vec<u8>, FeedError>;

/// Kind of data a watch job asks the transport process to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    /// Bars.
    Ohlcv,
    /// Order book snapshots.
    Book,
}

impl WatchKind {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ohlcv => "ohlcv",
            Self::Book => "book",
        }
    }
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to start watching one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchJob {
    /// Instrument to watch.
    pub symbol: Symbol,
    /// Timeframe to push.
    pub timeframe: Timeframe,
    /// Backfill start; bars from here on are pushed before live ones.
    pub since: Option<i64>,
}

/// Pub/sub connection to the live market-data process.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Address the transport connects to, for logs.
    fn address(&self) -> &str;

    /// Open (or reopen) the inbound stream. The receiver closing means disconnect.
    async fn connect(&self, buffer: usize) -> Result<mpsc::Receiver<Frame>, FeedError>;

    /// Subscribe to plain topics such as `price_{exchange}_{market}`.
    async fn subscribe(&self, topics: &[String]) -> Result<(), FeedError>;

    /// Unsubscribe plain topics.
    async fn unsubscribe(&self, topics: &[String]) -> Result<(), FeedError>;

    /// Ask the remote process to collect and push `kind` data for `jobs`.
    async fn watch_jobs(
        &self,
        exchange: &str,
        market: &str,
        kind: WatchKind,
        jobs: &[WatchJob],
    ) -> Result<(), FeedError>;

    /// Stop collecting `kind` data for `symbols`.
    async fn unwatch_jobs(
        &self,
        exchange: &str,
        market: &str,
        kind: WatchKind,
        symbols: &[Symbol],
    ) -> Result<(), FeedError>;
}

/// Bar update pushed for one instrument. Bars are ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMessage {
    /// Exchange identifier.
    pub exchange: String,
    /// Market identifier.
    pub market: String,
    /// Instrument symbol.
    pub instrument: String,
    /// Length of each bar in `bars`.
    pub timeframe_seconds: i64,
    /// How often the server pushes updates for this stream.
    pub push_interval_seconds: i64,
    /// Bars, oldest first.
    pub bars: Vec<Bar>,
}

impl LiveMessage {
    /// Timeframe of the bars, validated.
    ///
    /// # Errors
    /// Returns `Decode` when the length is not a positive number of seconds.
    pub fn timeframe(&self) -> Result<Timeframe, FeedError> {
        u32::try_from(self.timeframe_seconds)
            .ok()
            .and_then(|s| Timeframe::from_secs(s).ok())
            .ok_or_else(|| {
                FeedError::Decode(format!("bad timeframe seconds: {}", self.timeframe_seconds))
            })
    }

    /// Check structural invariants of a decoded message.
    ///
    /// # Errors
    /// Returns `Decode` for a bad timeframe, a negative push interval, a bar
    /// timestamp that is negative or whose close does not fit in `i64`, or
    /// bars that are not strictly ascending.
    pub fn validate(&self) -> Result<(), FeedError> {
        let tf = self.timeframe()?;
        if self.push_interval_seconds < 0 {
            return Err(FeedError::Decode(format!(
                "negative push interval: {}",
                self.push_interval_seconds
            )));
        }
        if let Some(bad) = self
            .bars
            .iter()
            .find(|b| b.ts < 0 || b.ts.checked_add(tf.ms()).is_none())
        {
            return Err(FeedError::Decode(format!(
                "bar timestamp out of range for {}: {}",
                self.instrument, bad.ts
            )));
        }
        if self.bars.windows(2).any(|w| w[0].ts >= w[1].ts) {
            return Err(FeedError::Decode(format!(
                "bars for {} are not ascending",
                self.instrument
            )));
        }
        Ok(())
    }
}

/// Last-price snapshot for one exchange and market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMessage {
    /// Exchange identifier.
    pub exchange: String,
    /// Market identifier.
    pub market: String,
    /// Symbol to last price.
    pub prices: HashMap<String, f64>,
}

/// Envelope of every inbound frame, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Inbound {
    /// Bar update.
    Ohlcv(LiveMessage),
    /// Price snapshot.
    Price(PriceMessage),
}

impl Inbound {
    /// Decode a JSON frame.
    ///
    /// # Errors
    /// Returns `Decode` for malformed JSON, unknown kinds or invalid bar updates.
    pub fn decode(frame: &[u8]) -> Result<Self, FeedError> {
        let msg: Self =
            serde_json::from_slice(frame).map_err(|e| FeedError::Decode(e.to_string()))?;
        if let Self::Ohlcv(m) = &msg {
            m.validate()?;
        }
        Ok(msg)
    }

    /// Encode as a JSON frame.
    ///
    /// # Errors
    /// Returns `Decode` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, FeedError> {
        serde_json::to_vec(self).map_err(|e| FeedError::Decode(e.to_string()))
    }

    /// Exchange and market the message belongs to.
    #[must_use]
    pub fn venue(&self) -> (&str, &str) {
        match self {
            Self::Ohlcv(m) => (&m.exchange, &m.market),
            Self::Price(p) => (&p.exchange, &p.market),
        }
    }
}
