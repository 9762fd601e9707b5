use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use barfeed_core::feeder::to_events;
use barfeed_core::timeseries::resample::BarAggregator;
use barfeed_core::{
    Bar, BarEvent, BarSink, FeedError, Feeder, HistorySource, Instrument, LiveFeeder,
    ProgressSink, Symbol, TfStates, Timeframe, TimeframeState,
};

use super::{min_timeframe, warm_from_store};

/// Live feeder fed by pushed bars that are already known to be final.
///
/// Accepts bars of its smallest timeframe directly, or of a smaller
/// timeframe dividing it, which are aggregated up first. Bars before the
/// cursor are ignored, so re-sent bars are never delivered twice.
pub struct LiveBarFeeder {
    instrument: Instrument,
    states: TfStates,
    history: Option<Arc<dyn HistorySource>>,
    sink: Arc<dyn BarSink>,
    pending: Option<Bar>,
    upsample: Option<BarAggregator>,
}

impl LiveBarFeeder {
    /// Create a feeder subscribed to `timeframes`.
    ///
    /// `history` serves warm-up bars; without one warm-up only positions
    /// the cursor.
    ///
    /// # Errors
    /// `InvalidArg` if `timeframes` is empty.
    pub fn new(
        instrument: Instrument,
        timeframes: &[Timeframe],
        history: Option<Arc<dyn HistorySource>>,
        sink: Arc<dyn BarSink>,
    ) -> Result<Self, FeedError> {
        if timeframes.is_empty() {
            return Err(FeedError::InvalidArg(format!(
                "no timeframes for {}",
                instrument.symbol
            )));
        }
        Ok(Self {
            instrument,
            states: TfStates::new(timeframes),
            history,
            sink,
            pending: None,
            upsample: None,
        })
    }

    /// Instrument metadata.
    #[must_use]
    pub const fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn fold_final(&mut self, bar: &Bar, out: &mut Vec<BarEvent>) {
        let cursor = self.states.min().map_or(0, |s| s.next_ms);
        if bar.ts < cursor {
            return;
        }
        out.extend(to_events(
            &self.instrument.symbol,
            self.states.fold_min_bar(bar),
        ));
    }
}

#[async_trait]
impl Feeder for LiveBarFeeder {
    fn symbol(&self) -> &Symbol {
        &self.instrument.symbol
    }

    fn states(&self) -> &[TimeframeState] {
        self.states.as_slice()
    }

    fn next_due_ms(&self) -> i64 {
        self.states.min().map_or(0, |s| s.next_ms)
    }

    fn sub_timeframes(&mut self, requested: &[Timeframe], drop_others: bool) -> Vec<Timeframe> {
        let old_min = self.states.min_timeframe();
        let added = self.states.subscribe(requested, drop_others);
        if self.states.min_timeframe() != old_min {
            self.pending = None;
            self.upsample = None;
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
        let store = self.history.as_deref().and_then(|h| h.as_bar_store());
        warm_from_store(
            store,
            &self.instrument,
            &mut self.states,
            self.sink.as_ref(),
            as_of_ms,
            counts,
            progress,
        )
        .await?;
        // The bar in progress at `as_of_ms` has not closed yet and is still due.
        let since = min_tf.align(as_of_ms);
        if counts.contains_key(&min_tf) {
            self.states.position(since);
            self.pending = None;
            self.upsample = None;
        }
        Ok(since)
    }

    fn fold_bar(&mut self, bar: &Bar) -> Result<Vec<BarEvent>, FeedError> {
        let mut out = Vec::new();
        self.fold_final(bar, &mut out);
        Ok(out)
    }

    fn sink(&self) -> Arc<dyn BarSink> {
        Arc::clone(&self.sink)
    }
}

impl LiveFeeder for LiveBarFeeder {
    fn pending_bar(&self) -> Option<&Bar> {
        self.pending.as_ref()
    }

    fn set_pending_bar(&mut self, bar: Option<Bar>) {
        self.pending = bar;
    }

    fn on_new_bars(&mut self, tf_ms: i64, bars: &[Bar]) -> Result<Vec<BarEvent>, FeedError> {
        let min_tf = min_timeframe(&self.states, &self.instrument)?;
        let min_ms = min_tf.ms();
        let mut out = Vec::new();
        if tf_ms == min_ms {
            for bar in bars {
                self.fold_final(bar, &mut out);
            }
            return Ok(out);
        }
        if tf_ms <= 0 || tf_ms > min_ms || min_ms % tf_ms != 0 {
            return Err(FeedError::Data(format!(
                "{}: cannot build {min_tf} bars from {tf_ms}ms bars",
                self.instrument.symbol
            )));
        }
        let mut agg = self
            .upsample
            .take()
            .unwrap_or_else(|| BarAggregator::new(min_tf));
        for bar in bars {
            for done in agg.push(bar, tf_ms) {
                self.fold_final(&done, &mut out);
            }
        }
        self.upsample = Some(agg);
        Ok(out)
    }
}
