//! Feeder contract shared by historical and live feeders.
//!
//! A feeder owns the cursor of one instrument across one or more
//! timeframes. Only the smallest timeframe is read from the data source;
//! larger ones are aggregated from it. The feeder's position in the global
//! replay order is always the next-due timestamp of that smallest timeframe.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::FeedError;
use crate::progress::ProgressSink;
use crate::sink::BarSink;
use crate::source::Downloader;
use crate::timeseries::resample::BarAggregator;
use crate::types::{Bar, BarEvent, Symbol, Timeframe};

/// Feeder shared between its provider and the scheduler.
pub type SharedFeeder<F> = Arc<tokio::sync::Mutex<F>>;

/// Cursor of one subscribed timeframe.
#[derive(Debug, Clone)]
pub struct TimeframeState {
    /// Subscribed timeframe.
    pub timeframe: Timeframe,
    /// Start of the next bar this timeframe will produce; `0` before positioning.
    pub next_ms: i64,
    aggregator: BarAggregator,
}

impl TimeframeState {
    /// Fresh, unpositioned state.
    #[must_use]
    pub const fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            next_ms: 0,
            aggregator: BarAggregator::new(timeframe),
        }
    }

    /// Timeframe length in seconds.
    #[must_use]
    pub const fn tf_secs(&self) -> i64 {
        self.timeframe.secs()
    }
}

/// Ordered set of timeframe cursors; the smallest timeframe is always first.
#[derive(Debug, Clone, Default)]
pub struct TfStates {
    states: Vec<TimeframeState>,
}

impl TfStates {
    /// Build from a list of timeframes, sorted and deduplicated.
    #[must_use]
    pub fn new(timeframes: &[Timeframe]) -> Self {
        let mut me = Self::default();
        me.subscribe(timeframes, false);
        me
    }

    /// All states, smallest timeframe first.
    #[must_use]
    pub fn as_slice(&self) -> &[TimeframeState] {
        &self.states
    }

    /// State of the smallest timeframe.
    #[must_use]
    pub fn min(&self) -> Option<&TimeframeState> {
        self.states.first()
    }

    /// Smallest subscribed timeframe.
    #[must_use]
    pub fn min_timeframe(&self) -> Option<Timeframe> {
        self.min().map(|s| s.timeframe)
    }

    /// Mutable state of `timeframe`.
    pub fn get_mut(&mut self, timeframe: Timeframe) -> Option<&mut TimeframeState> {
        self.states.iter_mut().find(|s| s.timeframe == timeframe)
    }

    /// Add `requested` timeframes; with `drop_others`, remove the rest.
    ///
    /// Returns the timeframes that were not subscribed before. When the
    /// smallest timeframe changes, every aggregator restarts.
    pub fn subscribe(&mut self, requested: &[Timeframe], drop_others: bool) -> Vec<Timeframe> {
        let old_min = self.min_timeframe();
        if drop_others {
            self.states.retain(|s| requested.contains(&s.timeframe));
        }
        let mut added = Vec::new();
        for tf in requested {
            if !self.states.iter().any(|s| s.timeframe == *tf) && !added.contains(tf) {
                added.push(*tf);
                self.states.push(TimeframeState::new(*tf));
            }
        }
        self.states.sort_by_key(|s| s.timeframe);
        if self.min_timeframe() != old_min {
            for st in &mut self.states {
                st.aggregator.reset();
            }
        }
        added.sort();
        added
    }

    /// Move every cursor to `since_ms` and restart aggregation.
    ///
    /// The smallest timeframe resumes exactly at `since_ms`; larger ones at
    /// their first bucket boundary at or after it.
    pub fn position(&mut self, since_ms: i64) {
        for (i, st) in self.states.iter_mut().enumerate() {
            st.next_ms = if i == 0 {
                since_ms
            } else {
                st.timeframe.align_up(since_ms)
            };
            st.aggregator.reset();
        }
    }

    /// Account for one bar of the smallest timeframe.
    ///
    /// Returns the bar itself followed by every larger-timeframe bar it
    /// completed, as `(timeframe, bar)` pairs.
    pub fn fold_min_bar(&mut self, bar: &Bar) -> Vec<(Timeframe, Bar)> {
        let Some((first, rest)) = self.states.split_first_mut() else {
            return Vec::new();
        };
        let src_ms = first.timeframe.ms();
        first.next_ms = bar.ts.saturating_add(src_ms);
        let mut out = vec![(first.timeframe, *bar)];
        for st in rest {
            for done in st.aggregator.push(bar, src_ms) {
                st.next_ms = done.close_ms(st.timeframe);
                out.push((st.timeframe, done));
            }
        }
        out
    }
}

/// Wrap `(timeframe, bar)` pairs into events for `symbol`.
#[must_use]
pub fn to_events(symbol: &Symbol, bars: Vec<(Timeframe, Bar)>) -> Vec<BarEvent> {
    bars.into_iter()
        .map(|(timeframe, bar)| BarEvent {
            symbol: symbol.clone(),
            timeframe,
            bar,
        })
        .collect()
}

/// Per-instrument cursor over one or more timeframes.
#[async_trait]
pub trait Feeder: Send + Sync {
    /// Instrument this feeder serves.
    fn symbol(&self) -> &Symbol;

    /// Timeframe states, smallest first.
    fn states(&self) -> &[TimeframeState];

    /// Timestamp of the next bar this feeder will produce.
    ///
    /// [`EXHAUSTED_MS`](crate::types::EXHAUSTED_MS) once no data remains;
    /// `0` while the feeder has not been positioned yet.
    fn next_due_ms(&self) -> i64;

    /// (Re)subscribe timeframes; returns the newly added ones.
    fn sub_timeframes(&mut self, requested: &[Timeframe], drop_others: bool) -> Vec<Timeframe>;

    /// Load `counts[tf]` bars per timeframe closing by `as_of_ms` into the sink.
    ///
    /// Returns the timestamp from which the smallest timeframe should resume.
    async fn warm_up(
        &mut self,
        as_of_ms: i64,
        counts: &BTreeMap<Timeframe, usize>,
        progress: &dyn ProgressSink,
    ) -> Result<i64, FeedError>;

    /// Account for a bar of the smallest timeframe and return the events to deliver.
    ///
    /// Callers release the feeder lock before handing the events to the sink.
    fn fold_bar(&mut self, bar: &Bar) -> Result<Vec<BarEvent>, FeedError>;

    /// Engine callback bars are delivered to.
    fn sink(&self) -> Arc<dyn BarSink>;
}

/// Replay-mode capabilities.
#[async_trait]
pub trait HistFeeder: Feeder {
    /// The next due bar, or `None` once exhausted. Does not move the cursor.
    async fn pull_next_bar(&mut self) -> Result<Option<Bar>, FeedError>;

    /// Commit the cursor past the bar returned by `pull_next_bar`.
    async fn advance_cursor(&mut self) -> Result<(), FeedError>;

    /// Reposition the cursor, e.g. after the instrument set changed mid-replay.
    async fn set_cursor(&mut self, since_ms: i64) -> Result<(), FeedError>;

    /// Ask `downloader` to fill storage gaps for every subscribed timeframe.
    async fn download_if_needed(
        &mut self,
        downloader: &dyn Downloader,
        progress: &dyn ProgressSink,
    ) -> Result<(), FeedError>;
}

/// Live-mode capabilities.
pub trait LiveFeeder: Feeder {
    /// Bar received but not yet certified complete.
    fn pending_bar(&self) -> Option<&Bar>;

    /// Replace the pending bar.
    fn set_pending_bar(&mut self, bar: Option<Bar>);

    /// Accept bars of length `tf_ms` that are known to be final.
    ///
    /// Returns the events to deliver; bars before the cursor are skipped.
    fn on_new_bars(&mut self, tf_ms: i64, bars: &[Bar]) -> Result<Vec<BarEvent>, FeedError>;
}

/// Deliver `events` in order, stopping at the first error.
///
/// # Errors
/// Propagates the sink's error.
pub async fn deliver(sink: &dyn BarSink, events: &[BarEvent]) -> Result<(), FeedError> {
    for ev in events {
        sink.on_bar(ev).await?;
    }
    Ok(())
}
