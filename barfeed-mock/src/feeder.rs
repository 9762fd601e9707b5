use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use barfeed_core::feeder::to_events;
use barfeed_core::{
    Bar, BarEvent, BarSink, Downloader, EXHAUSTED_MS, FeedError, Feeder, HistFeeder,
    ProgressPhase, ProgressSink, SharedFeeder, Symbol, TfStates, Timeframe, TimeframeState,
};

/// Replay feeder over a fixed vector of smallest-timeframe bars.
///
/// Starts positioned at its first bar.
pub struct VecFeeder {
    symbol: Symbol,
    states: TfStates,
    bars: Vec<Bar>,
    pos: usize,
    sink: Arc<dyn BarSink>,
    fail_at: Option<i64>,
    downloads: usize,
}

impl VecFeeder {
    /// Feeder of `symbol` replaying `bars` (sorted here) at `timeframes`.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        timeframes: &[Timeframe],
        mut bars: Vec<Bar>,
        sink: Arc<dyn BarSink>,
    ) -> Self {
        bars.sort_by_key(|b| b.ts);
        let mut states = TfStates::new(timeframes);
        if let Some(first) = bars.first() {
            states.position(first.ts);
        }
        Self {
            symbol,
            states,
            bars,
            pos: 0,
            sink,
            fail_at: None,
            downloads: 0,
        }
    }

    /// Make `pull_next_bar` fail when the bar at `ts` is due.
    #[must_use]
    pub const fn failing_at(mut self, ts: i64) -> Self {
        self.fail_at = Some(ts);
        self
    }

    /// Wrap for sharing with a provider or scheduler.
    #[must_use]
    pub fn shared(self) -> SharedFeeder<Self> {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Number of bars already replayed.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Number of download checks received.
    #[must_use]
    pub const fn downloads(&self) -> usize {
        self.downloads
    }
}

#[async_trait]
impl Feeder for VecFeeder {
    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn states(&self) -> &[TimeframeState] {
        self.states.as_slice()
    }

    fn next_due_ms(&self) -> i64 {
        self.bars.get(self.pos).map_or(EXHAUSTED_MS, |b| b.ts)
    }

    fn sub_timeframes(&mut self, requested: &[Timeframe], drop_others: bool) -> Vec<Timeframe> {
        self.states.subscribe(requested, drop_others)
    }

    async fn warm_up(
        &mut self,
        as_of_ms: i64,
        counts: &BTreeMap<Timeframe, usize>,
        progress: &dyn ProgressSink,
    ) -> Result<i64, FeedError> {
        let min_tf = self
            .states
            .min_timeframe()
            .ok_or_else(|| FeedError::Data(format!("{} has no timeframes", self.symbol)))?;
        if let Some(&count) = counts.get(&min_tf) {
            let before: Vec<Bar> = self.bars.iter().filter(|b| b.ts < as_of_ms).copied().collect();
            let skip = before.len().saturating_sub(count);
            self.sink
                .on_warm_bars(&self.symbol, min_tf, &before[skip..])
                .await?;
        }
        progress.advance(ProgressPhase::Warmup, counts.len() as u64);
        Ok(min_tf.align_up(as_of_ms))
    }

    fn fold_bar(&mut self, bar: &Bar) -> Result<Vec<BarEvent>, FeedError> {
        Ok(to_events(&self.symbol, self.states.fold_min_bar(bar)))
    }

    fn sink(&self) -> Arc<dyn BarSink> {
        Arc::clone(&self.sink)
    }
}

#[async_trait]
impl HistFeeder for VecFeeder {
    async fn pull_next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        let bar = self.bars.get(self.pos).copied();
        if let (Some(b), Some(ts)) = (bar, self.fail_at)
            && b.ts == ts
        {
            return Err(FeedError::Data(format!("{} failed at {ts}", self.symbol)));
        }
        Ok(bar)
    }

    async fn advance_cursor(&mut self) -> Result<(), FeedError> {
        if self.pos < self.bars.len() {
            self.pos += 1;
        }
        Ok(())
    }

    async fn set_cursor(&mut self, since_ms: i64) -> Result<(), FeedError> {
        self.pos = self.bars.partition_point(|b| b.ts < since_ms);
        self.states.position(since_ms);
        Ok(())
    }

    async fn download_if_needed(
        &mut self,
        _downloader: &dyn Downloader,
        progress: &dyn ProgressSink,
    ) -> Result<(), FeedError> {
        self.downloads += 1;
        progress.advance(ProgressPhase::Download, 1);
        Ok(())
    }
}
