use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use barfeed_core::timeseries::resample::resample;
use barfeed_core::{
    Bar, BarStore, Downloader, FeedError, HistorySource, Instrument, Symbol, TimeRange, Timeframe,
};

type SeriesKey = (Symbol, Timeframe);

#[derive(Default)]
struct StoreState {
    stored: HashMap<SeriesKey, Vec<Bar>>,
    remote: HashMap<SeriesKey, Vec<Bar>>,
    failures: HashMap<Symbol, FeedError>,
    download_failures: HashMap<Symbol, FeedError>,
    range_queries: usize,
    downloads: Vec<(Symbol, Timeframe, TimeRange)>,
}

impl StoreState {
    /// Stored bars of `tf`, or bars resampled from the smallest stored timeframe dividing it.
    fn series(&self, symbol: &Symbol, tf: Timeframe) -> Vec<Bar> {
        if let Some(bars) = self.stored.get(&(symbol.clone(), tf)) {
            return bars.clone();
        }
        let src = self
            .stored
            .keys()
            .filter(|(s, src)| s == symbol && *src < tf && tf.is_multiple_of(*src))
            .map(|(_, src)| *src)
            .min();
        match src {
            Some(src) => resample(&self.stored[&(symbol.clone(), src)], src, tf),
            None => Vec::new(),
        }
    }

    fn check(&self, symbol: &Symbol) -> Result<(), FeedError> {
        match self.failures.get(symbol) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

fn merge_into(dst: &mut Vec<Bar>, bars: Vec<Bar>) -> usize {
    let before = dst.len();
    dst.extend(bars);
    dst.sort_by_key(|b| b.ts);
    dst.dedup_by_key(|b| b.ts);
    dst.len() - before
}

/// In-memory bar store and downloader.
///
/// Bars "on the exchange" are set with [`set_remote`](Self::set_remote) and
/// copied into storage by `download_if_needed`.
pub struct MemoryStore {
    name: &'static str,
    can_download: bool,
    state: Mutex<StoreState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store that can also download.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "memory",
            can_download: true,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Disable the download capability.
    #[must_use]
    pub const fn without_download(mut self) -> Self {
        self.can_download = false;
        self
    }

    /// Store `bars` of `tf` for `symbol`, keeping existing bars at other timestamps.
    pub fn insert(&self, symbol: &Symbol, tf: Timeframe, bars: Vec<Bar>) {
        let mut st = self.state.lock().expect("mutex poisoned");
        merge_into(st.stored.entry((symbol.clone(), tf)).or_default(), bars);
    }

    /// Bars a download for `symbol`/`tf` will write.
    pub fn set_remote(&self, symbol: &Symbol, tf: Timeframe, bars: Vec<Bar>) {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.remote.insert((symbol.clone(), tf), bars);
    }

    /// Fail every query and download for `symbol` with `err`.
    pub fn fail_symbol(&self, symbol: &Symbol, err: FeedError) {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.failures.insert(symbol.clone(), err);
    }

    /// Fail only downloads for `symbol` with `err`; stored bars stay readable.
    pub fn fail_download(&self, symbol: &Symbol, err: FeedError) {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.download_failures.insert(symbol.clone(), err);
    }

    /// Serve every symbol again.
    pub fn clear_failures(&self) {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.failures.clear();
        st.download_failures.clear();
    }

    /// Stored (or resampled) bars of `tf` for `symbol`.
    #[must_use]
    pub fn bars(&self, symbol: &Symbol, tf: Timeframe) -> Vec<Bar> {
        self.state.lock().expect("mutex poisoned").series(symbol, tf)
    }

    /// Download requests received so far.
    #[must_use]
    pub fn downloads(&self) -> Vec<(Symbol, Timeframe, TimeRange)> {
        self.state.lock().expect("mutex poisoned").downloads.clone()
    }

    /// Number of range queries served.
    #[must_use]
    pub fn range_queries(&self) -> usize {
        self.state.lock().expect("mutex poisoned").range_queries
    }
}

impl HistorySource for MemoryStore {
    fn name(&self) -> &'static str {
        self.name
    }

    fn as_bar_store(&self) -> Option<&dyn BarStore> {
        Some(self as &dyn BarStore)
    }

    fn as_downloader(&self) -> Option<&dyn Downloader> {
        if self.can_download {
            Some(self as &dyn Downloader)
        } else {
            None
        }
    }
}

#[async_trait]
impl BarStore for MemoryStore {
    async fn bars_in_range(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<Vec<Bar>, FeedError> {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.check(&instrument.symbol)?;
        st.range_queries += 1;
        Ok(st
            .series(&instrument.symbol, timeframe)
            .into_iter()
            .filter(|b| b.ts >= start_ms && b.ts < end_ms)
            .take(limit)
            .collect())
    }

    async fn bars_before(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        end_ms: i64,
        count: usize,
    ) -> Result<Vec<Bar>, FeedError> {
        let st = self.state.lock().expect("mutex poisoned");
        st.check(&instrument.symbol)?;
        let bars: Vec<Bar> = st
            .series(&instrument.symbol, timeframe)
            .into_iter()
            .filter(|b| b.ts < end_ms)
            .collect();
        let skip = bars.len().saturating_sub(count);
        Ok(bars.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl Downloader for MemoryStore {
    async fn download_if_needed(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Result<usize, FeedError> {
        let mut st = self.state.lock().expect("mutex poisoned");
        st.check(&instrument.symbol)
            .map_err(|e| FeedError::source(self.name, e.to_string()))?;
        if let Some(e) = st.download_failures.get(&instrument.symbol) {
            return Err(e.clone());
        }
        let key = (instrument.symbol.clone(), timeframe);
        st.downloads.push((key.0.clone(), timeframe, range));
        let fresh: Vec<Bar> = st
            .remote
            .get(&key)
            .map(|bars| bars.iter().filter(|b| range.contains(b.ts)).copied().collect())
            .unwrap_or_default();
        if fresh.is_empty() {
            return Ok(0);
        }
        Ok(merge_into(st.stored.entry(key).or_default(), fresh))
    }
}
