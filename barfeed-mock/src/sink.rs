use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use barfeed_core::{Bar, BarEvent, BarSink, FeedError, Symbol, Timeframe};
use futures::future::BoxFuture;

/// Callback run after a bar was recorded; its error is returned from `on_bar`.
pub type BarHook = Arc<dyn Fn(BarEvent) -> BoxFuture<'static, Result<(), FeedError>> + Send + Sync>;

#[derive(Default)]
struct SinkState {
    events: Vec<BarEvent>,
    warm: Vec<(Symbol, Timeframe, Vec<Bar>)>,
    prices: Vec<HashMap<String, f64>>,
    hook: Option<BarHook>,
}

/// Engine callback that records everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<SinkState>,
    delay: Option<Duration>,
    fail_at: Option<(Symbol, i64)>,
    inflight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingSink {
    /// Sink that accepts every bar immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every `on_bar` call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail delivery of the bar of `symbol` starting at `ts`.
    #[must_use]
    pub fn fail_on(mut self, symbol: Symbol, ts: i64) -> Self {
        self.fail_at = Some((symbol, ts));
        self
    }

    /// Install `hook`, e.g. to call back into a provider from delivery.
    pub fn set_hook(&self, hook: BarHook) {
        self.state.lock().expect("mutex poisoned").hook = Some(hook);
    }

    /// Every recorded event in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<BarEvent> {
        self.state.lock().expect("mutex poisoned").events.clone()
    }

    /// Recorded bars of `symbol` at `timeframe`.
    #[must_use]
    pub fn bars_of(&self, symbol: &Symbol, timeframe: Timeframe) -> Vec<Bar> {
        self.state
            .lock()
            .expect("mutex poisoned")
            .events
            .iter()
            .filter(|e| &e.symbol == symbol && e.timeframe == timeframe)
            .map(|e| e.bar)
            .collect()
    }

    /// Warm-up batches in arrival order.
    #[must_use]
    pub fn warm(&self) -> Vec<(Symbol, Timeframe, Vec<Bar>)> {
        self.state.lock().expect("mutex poisoned").warm.clone()
    }

    /// Price snapshots in arrival order.
    #[must_use]
    pub fn prices(&self) -> Vec<HashMap<String, f64>> {
        self.state.lock().expect("mutex poisoned").prices.clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().expect("mutex poisoned").events.len()
    }

    /// True when nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most `on_bar` calls observed running at the same time.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn record(&self, event: &BarEvent) -> Result<(), FeedError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if let Some((sym, ts)) = &self.fail_at
            && &event.symbol == sym
            && event.bar.ts == *ts
        {
            return Err(FeedError::delivery(sym.as_str(), "injected failure"));
        }
        let hook = {
            let mut st = self.state.lock().expect("mutex poisoned");
            st.events.push(event.clone());
            st.hook.clone()
        };
        match hook {
            Some(hook) => hook(event.clone()).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BarSink for RecordingSink {
    async fn on_bar(&self, event: &BarEvent) -> Result<(), FeedError> {
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let res = self.record(event).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        res
    }

    async fn on_warm_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        bars: &[Bar],
    ) -> Result<(), FeedError> {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.warm.push((symbol.clone(), timeframe, bars.to_vec()));
        Ok(())
    }

    async fn on_prices(&self, prices: &HashMap<String, f64>) -> Result<(), FeedError> {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.prices.push(prices.clone());
        Ok(())
    }
}
