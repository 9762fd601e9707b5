//! Traits for historical storage, gap download and symbol metadata.

use async_trait::async_trait;

use crate::types::{Bar, Instrument, Symbol, Timeframe};
use crate::{FeedError, TimeRange};

/// Read access to stored bars.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Bars with `start_ms <= ts < end_ms`, ascending, at most `limit` of them.
    async fn bars_in_range(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<Vec<Bar>, FeedError>;

    /// The last `count` bars with `ts < end_ms`, ascending.
    async fn bars_before(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        end_ms: i64,
        count: usize,
    ) -> Result<Vec<Bar>, FeedError>;
}

/// Fills gaps in storage from the exchange.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Make sure bars of `timeframe` covering `range` are stored.
    ///
    /// Returns the number of bars written.
    async fn download_if_needed(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Result<usize, FeedError>;
}

/// Historical data source with optional capabilities.
///
/// Capabilities are discovered at runtime: a source that cannot download
/// returns `None` from [`as_downloader`](Self::as_downloader) and the
/// download step is skipped.
pub trait HistorySource: Send + Sync {
    /// Stable name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Stored bar access, if supported.
    fn as_bar_store(&self) -> Option<&dyn BarStore> {
        None
    }

    /// Gap download, if supported.
    fn as_downloader(&self) -> Option<&dyn Downloader> {
        None
    }
}

/// Resolves a symbol to canonical instrument metadata.
#[async_trait]
pub trait SymbolResolver: Send + Sync {
    /// Look up `symbol` on `exchange`/`market`.
    async fn resolve(
        &self,
        exchange: &str,
        market: &str,
        symbol: &Symbol,
    ) -> Result<Instrument, FeedError>;
}
