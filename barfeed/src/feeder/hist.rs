use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use barfeed_core::feeder::to_events;
use barfeed_core::{
    Bar, BarEvent, BarSink, BarStore, Capability, Downloader, EXHAUSTED_MS, FeedError, Feeder,
    HistFeeder, HistorySource, Instrument, ProgressPhase, ProgressSink, Symbol, TfStates,
    TimeRange, Timeframe, TimeframeState,
};

use super::{min_timeframe, warm_from_store};

/// Replay feeder reading the smallest timeframe from a [`BarStore`].
///
/// Bars are read in batches of `fetch_batch` within the replay window;
/// larger timeframes are aggregated from them. Once positioned, the buffer
/// holds at least one bar until the store runs dry.
pub struct StoreFeeder {
    instrument: Instrument,
    states: TfStates,
    source: Arc<dyn HistorySource>,
    sink: Arc<dyn BarSink>,
    range: TimeRange,
    fetch_batch: usize,
    buffer: VecDeque<Bar>,
    read_from: i64,
    positioned: bool,
    exhausted: bool,
}

impl StoreFeeder {
    /// Create an unpositioned feeder subscribed to `timeframes`.
    ///
    /// # Errors
    /// `Unsupported` if `source` cannot serve stored bars; `InvalidArg` if
    /// `timeframes` is empty.
    pub fn new(
        instrument: Instrument,
        timeframes: &[Timeframe],
        source: Arc<dyn HistorySource>,
        sink: Arc<dyn BarSink>,
        range: TimeRange,
        fetch_batch: usize,
    ) -> Result<Self, FeedError> {
        if source.as_bar_store().is_none() {
            return Err(FeedError::unsupported(Capability::FetchBars.as_str()));
        }
        if timeframes.is_empty() {
            return Err(FeedError::InvalidArg(format!(
                "no timeframes for {}",
                instrument.symbol
            )));
        }
        Ok(Self {
            instrument,
            states: TfStates::new(timeframes),
            source,
            sink,
            range,
            fetch_batch: fetch_batch.max(1),
            buffer: VecDeque::new(),
            read_from: 0,
            positioned: false,
            exhausted: false,
        })
    }

    /// Instrument metadata.
    #[must_use]
    pub const fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn store(&self) -> Result<&dyn BarStore, FeedError> {
        self.source
            .as_bar_store()
            .ok_or_else(|| FeedError::unsupported(Capability::FetchBars.as_str()))
    }

    fn unposition(&mut self) {
        self.buffer.clear();
        self.positioned = false;
        self.exhausted = false;
    }

    async fn fill(&mut self) -> Result<(), FeedError> {
        if !self.buffer.is_empty() || self.exhausted {
            return Ok(());
        }
        let tf = min_timeframe(&self.states, &self.instrument)?;
        let start = self.read_from.max(self.range.start_ms);
        if start >= self.range.end_ms {
            self.exhausted = true;
            return Ok(());
        }
        let bars = self
            .store()?
            .bars_in_range(&self.instrument, tf, start, self.range.end_ms, self.fetch_batch)
            .await?;
        match bars.last() {
            Some(last) => {
                self.read_from = last.ts + tf.ms();
                self.buffer.extend(bars.into_iter().filter(|b| b.ts >= start));
                if self.buffer.is_empty() {
                    self.exhausted = true;
                }
            }
            None => self.exhausted = true,
        }
        Ok(())
    }
}

#[async_trait]
impl Feeder for StoreFeeder {
    fn symbol(&self) -> &Symbol {
        &self.instrument.symbol
    }

    fn states(&self) -> &[TimeframeState] {
        self.states.as_slice()
    }

    fn next_due_ms(&self) -> i64 {
        match self.buffer.front() {
            Some(bar) => bar.ts,
            None if self.exhausted => EXHAUSTED_MS,
            None => 0,
        }
    }

    fn sub_timeframes(&mut self, requested: &[Timeframe], drop_others: bool) -> Vec<Timeframe> {
        let old_min = self.states.min_timeframe();
        let added = self.states.subscribe(requested, drop_others);
        if self.states.min_timeframe() != old_min {
            self.unposition();
        }
        added
    }

    async fn warm_up(
        &mut self,
        as_of_ms: i64,
        counts: &BTreeMap<Timeframe, usize>,
        progress: &dyn ProgressSink,
    ) -> Result<i64, FeedError> {
        let min_tf = min_timeframe(&self.states, &self.instrument)?;
        warm_from_store(
            self.source.as_bar_store(),
            &self.instrument,
            &mut self.states,
            self.sink.as_ref(),
            as_of_ms,
            counts,
            progress,
        )
        .await?;
        Ok(min_tf.align_up(as_of_ms))
    }

    fn fold_bar(&mut self, bar: &Bar) -> Result<Vec<BarEvent>, FeedError> {
        Ok(to_events(&self.instrument.symbol, self.states.fold_min_bar(bar)))
    }

    fn sink(&self) -> Arc<dyn BarSink> {
        Arc::clone(&self.sink)
    }
}

#[async_trait]
impl HistFeeder for StoreFeeder {
    async fn pull_next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        if !self.positioned {
            return Err(FeedError::Data(format!(
                "{} pulled before its cursor was set",
                self.instrument.symbol
            )));
        }
        self.fill().await?;
        Ok(self.buffer.front().copied())
    }

    async fn advance_cursor(&mut self) -> Result<(), FeedError> {
        self.buffer.pop_front();
        self.fill().await
    }

    async fn set_cursor(&mut self, since_ms: i64) -> Result<(), FeedError> {
        self.unposition();
        self.states.position(since_ms);
        self.read_from = since_ms;
        self.positioned = true;
        self.fill().await
    }

    async fn download_if_needed(
        &mut self,
        downloader: &dyn Downloader,
        progress: &dyn ProgressSink,
    ) -> Result<(), FeedError> {
        for st in self.states.as_slice() {
            let _written = downloader
                .download_if_needed(&self.instrument, st.timeframe, self.range)
                .await?;
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "barfeed::download",
                symbol = %self.instrument.symbol,
                timeframe = %st.timeframe,
                written = _written,
                "download checked"
            );
        }
        progress.advance(ProgressPhase::Download, 1);
        Ok(())
    }
}
