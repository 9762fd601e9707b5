use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use barfeed_core::{
    FeedError, Feeder, ProgressPhase, ProgressSink, ResumeKey, SharedFeeder, Symbol, Timeframe,
};

use crate::util::parallel_run;

/// Warm-up work for one feeder: how many bars to pre-load per timeframe.
///
/// Built for instruments seen for the first time (every requested timeframe)
/// and for known instruments that gained timeframes (only the new ones).
pub struct WarmJob<F: ?Sized> {
    /// Instrument of the feeder.
    pub symbol: Symbol,
    /// Feeder to warm up.
    pub feeder: SharedFeeder<F>,
    /// Bars to load per timeframe.
    pub counts: BTreeMap<Timeframe, usize>,
}

impl<F: ?Sized> WarmJob<F> {
    /// Units of progress this job reports: one per timeframe.
    #[must_use]
    pub fn units(&self) -> u64 {
        self.counts.len() as u64
    }
}

/// Warm up every job with at most `workers` feeders in flight.
///
/// Returns the resume timestamp of each feeder keyed by its symbol and
/// smallest timeframe. The first failure stops new jobs from starting;
/// jobs already running complete before the error is returned.
///
/// # Errors
/// The first error returned by a feeder's `warm_up`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(name = "barfeed::warm_up", skip(jobs, progress), fields(jobs = jobs.len()))
)]
pub async fn run_warm_jobs<F>(
    jobs: Vec<WarmJob<F>>,
    workers: usize,
    as_of_ms: i64,
    progress: Arc<dyn ProgressSink>,
) -> Result<HashMap<ResumeKey, i64>, FeedError>
where
    F: Feeder + ?Sized + 'static,
{
    let total = jobs.iter().map(WarmJob::units).sum();
    progress.start(ProgressPhase::Warmup, total);

    let since: Arc<Mutex<HashMap<ResumeKey, i64>>> = Arc::new(Mutex::new(HashMap::new()));
    let res = parallel_run(jobs, workers, |job: WarmJob<F>| {
        let since = Arc::clone(&since);
        let progress = Arc::clone(&progress);
        async move {
            let mut feeder = job.feeder.lock().await;
            let ts = feeder
                .warm_up(as_of_ms, &job.counts, progress.as_ref())
                .await?;
            let Some(min_tf) = feeder.states().first().map(|s| s.timeframe) else {
                return Ok(());
            };
            drop(feeder);
            since
                .lock()
                .expect("mutex poisoned")
                .insert(ResumeKey::new(job.symbol, min_tf), ts);
            Ok(())
        }
    })
    .await;
    progress.finish(ProgressPhase::Warmup);
    res?;

    let map = std::mem::take(&mut *since.lock().expect("mutex poisoned"));
    Ok(map)
}
