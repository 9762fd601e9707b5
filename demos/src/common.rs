use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use barfeed_core::{Bar, BarEvent, BarSink, FeedError, Symbol, TimeRange, Timeframe};
use barfeed_mock::MemoryStore;
use barfeed_mock::fixtures::{series, sym};

/// 2024-01-01T00:00:00Z.
pub const START_MS: i64 = 1_704_067_200_000;

/// Store holding `minutes` one-minute bars per symbol from [`START_MS`],
/// plus a day of history before it for warm-up.
///
/// The replay window itself is only "on the exchange" and gets downloaded.
#[must_use]
pub fn demo_store(symbols: &[&str], minutes: usize) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    let day = 24 * 60;
    for (i, s) in symbols.iter().enumerate() {
        let base = 100.0 * (i as f64 + 1.0);
        let history_start = START_MS - i64::try_from(day).unwrap_or(0) * Timeframe::M1.ms();
        store.insert(&sym(s), Timeframe::M1, series(history_start, Timeframe::M1, day, base));
        store.set_remote(&sym(s), Timeframe::M1, series(START_MS, Timeframe::M1, minutes, base));
    }
    Arc::new(store)
}

/// Replay window of `minutes` from [`START_MS`].
///
/// # Panics
/// If `minutes` is zero.
#[must_use]
pub fn demo_window(minutes: i64) -> TimeRange {
    TimeRange::new(START_MS, START_MS + minutes * Timeframe::M1.ms()).expect("non-empty window")
}

/// Engine stand-in: counts bars per (symbol, timeframe) and prints the larger ones.
#[derive(Default)]
pub struct PrintSink {
    counts: Mutex<HashMap<(Symbol, Timeframe), usize>>,
    print_from: Option<Timeframe>,
}

impl PrintSink {
    /// Print bars of `tf` and above as they arrive.
    #[must_use]
    pub fn printing_from(tf: Timeframe) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            print_from: Some(tf),
        }
    }

    /// Print the per-stream totals, ordered.
    pub fn summary(&self) {
        let counts = self.counts.lock().expect("mutex poisoned");
        let mut rows: Vec<_> = counts.iter().collect();
        rows.sort();
        for ((symbol, tf), n) in rows {
            println!("{symbol:<10} {tf:>4} {n:>5} bars");
        }
    }
}

#[async_trait]
impl BarSink for PrintSink {
    async fn on_bar(&self, event: &BarEvent) -> Result<(), FeedError> {
        *self
            .counts
            .lock()
            .expect("mutex poisoned")
            .entry((event.symbol.clone(), event.timeframe))
            .or_default() += 1;
        if self.print_from.is_some_and(|tf| event.timeframe >= tf) {
            let at = event
                .bar
                .time()
                .map_or_else(|| event.bar.ts.to_string(), |t| t.to_rfc3339());
            println!(
                "{at} {:<10} {:>4} o={:.2} h={:.2} l={:.2} c={:.2}",
                event.symbol, event.timeframe, event.bar.open, event.bar.high, event.bar.low, event.bar.close
            );
        }
        Ok(())
    }

    async fn on_warm_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        bars: &[Bar],
    ) -> Result<(), FeedError> {
        println!("warm-up {symbol} {timeframe}: {} bars", bars.len());
        Ok(())
    }

    async fn on_prices(&self, prices: &HashMap<String, f64>) -> Result<(), FeedError> {
        println!("prices: {} symbols", prices.len());
        Ok(())
    }
}
