use crate::types::{Bar, Timeframe};

/// Incremental builder of `target` bars from a stream of smaller bars.
///
/// A bar is emitted as soon as the source bar covering the end of its bucket
/// arrives, or when a source bar for a later bucket shows up first (gap).
/// The first bucket seen after construction or [`reset`](Self::reset) is
/// dropped when it did not start on the bucket boundary, since its open and
/// volume would be incomplete.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    target: Timeframe,
    wip: Option<Bar>,
    partial: bool,
    primed: bool,
}

impl BarAggregator {
    /// Create an empty aggregator for `target` bars.
    #[must_use]
    pub const fn new(target: Timeframe) -> Self {
        Self {
            target,
            wip: None,
            partial: false,
            primed: false,
        }
    }

    /// Target timeframe.
    #[must_use]
    pub const fn target(&self) -> Timeframe {
        self.target
    }

    /// Forget the bucket in progress, e.g. after the source cursor jumped.
    pub fn reset(&mut self) {
        self.wip = None;
        self.partial = false;
        self.primed = false;
    }

    /// Bucket in progress, if any.
    #[must_use]
    pub fn in_progress(&self) -> Option<&Bar> {
        self.wip.as_ref()
    }

    /// Feed one source bar of length `src_ms`; returns the target bars it completed.
    pub fn push(&mut self, bar: &Bar, src_ms: i64) -> Vec<Bar> {
        let bucket = self.target.align(bar.ts);
        let mut done = Vec::new();
        if self.wip.is_some_and(|w| w.ts != bucket)
            && let Some(b) = self.take()
        {
            done.push(b);
        }
        match &mut self.wip {
            Some(w) => {
                w.high = w.high.max(bar.high);
                w.low = w.low.min(bar.low);
                w.close = bar.close;
                w.volume += bar.volume;
            }
            None => {
                self.partial = !self.primed && bar.ts != bucket;
                self.primed = true;
                self.wip = Some(Bar { ts: bucket, ..*bar });
            }
        }
        if bar.ts.saturating_add(src_ms) >= bucket.saturating_add(self.target.ms())
            && let Some(b) = self.take()
        {
            done.push(b);
        }
        done
    }

    fn take(&mut self) -> Option<Bar> {
        let bar = self.wip.take()?;
        if std::mem::take(&mut self.partial) {
            return None;
        }
        Some(bar)
    }
}

/// Resample an ascending series of `src` bars into complete `target` bars.
///
/// The trailing bucket is returned only if the series covers it to the end.
#[must_use]
pub fn resample(bars: &[Bar], src: Timeframe, target: Timeframe) -> Vec<Bar> {
    let mut agg = BarAggregator::new(target);
    bars.iter().flat_map(|b| agg.push(b, src.ms())).collect()
}
