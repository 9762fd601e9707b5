use std::collections::HashMap;

use async_trait::async_trait;

use crate::FeedError;
use crate::types::{Bar, BarEvent, Symbol, Timeframe};

/// Trading-engine callback that receives bars from replay and live feeds.
///
/// An error from [`on_bar`](Self::on_bar) is fatal to the replay run that
/// produced it; on the live path it is logged and the message is dropped.
#[async_trait]
pub trait BarSink: Send + Sync {
    /// A bar is final and ready for the engine.
    async fn on_bar(&self, event: &BarEvent) -> Result<(), FeedError>;

    /// Historical bars loaded during warm-up to seed indicator state.
    async fn on_warm_bars(
        &self,
        _symbol: &Symbol,
        _timeframe: Timeframe,
        _bars: &[Bar],
    ) -> Result<(), FeedError> {
        Ok(())
    }

    /// Last-price snapshot pushed by the live transport.
    async fn on_prices(&self, _prices: &HashMap<String, f64>) -> Result<(), FeedError> {
        Ok(())
    }
}
