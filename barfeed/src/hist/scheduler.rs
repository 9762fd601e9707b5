use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use barfeed_core::{
    Bar, BarEvent, BarSink, Clock, FeedError, HistFeeder, ProgressPhase, ProgressSink,
    ReplayClock, SharedFeeder, deliver,
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinSet;

use super::order::{Entry, insert_sorted, sort_all};
use crate::control::Control;

/// Per-session state the replay loop reads and advances.
#[derive(Clone)]
pub struct ReplayContext {
    /// Simulated time; moved to each new time slice's bar close.
    pub clock: Arc<ReplayClock>,
    /// Receives one replay unit per simulated second.
    pub progress: Arc<dyn ProgressSink>,
    /// Most same-timestamp deliveries running at once.
    pub max_inflight: usize,
}

impl ReplayContext {
    /// Context with `max_inflight` of 8.
    #[must_use]
    pub fn new(clock: Arc<ReplayClock>, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            clock,
            progress,
            max_inflight: 8,
        }
    }

    /// Bound same-timestamp concurrency; zero is treated as one.
    #[must_use]
    pub fn with_max_inflight(mut self, n: usize) -> Self {
        self.max_inflight = n.max(1);
        self
    }
}

/// Deliveries of the current time slice running in the background.
struct Batch {
    tasks: JoinSet<()>,
    first_err: Arc<OnceLock<FeedError>>,
    limit: usize,
}

impl Batch {
    fn new(limit: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            first_err: Arc::new(OnceLock::new()),
            limit: limit.max(1),
        }
    }

    async fn spawn(&mut self, job: Delivery) {
        while self.tasks.len() >= self.limit {
            self.join_one().await;
        }
        let first_err = Arc::clone(&self.first_err);
        self.tasks.spawn(async move {
            if first_err.get().is_some() {
                return;
            }
            if let Err(e) = deliver(job.sink.as_ref(), &job.events).await {
                let _ = first_err.set(e);
            }
        });
    }

    async fn join_one(&mut self) {
        if let Some(Err(e)) = self.tasks.join_next().await {
            let _ = self
                .first_err
                .set(FeedError::Other(format!("delivery task failed: {e}")));
        }
    }

    /// Barrier: wait for every in-flight delivery, then report the first failure.
    async fn wait(&mut self) -> Result<(), FeedError> {
        while !self.tasks.is_empty() {
            self.join_one().await;
        }
        match self.first_err.get() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

struct Delivery {
    sink: Arc<dyn BarSink>,
    events: Vec<BarEvent>,
}

struct Pulled {
    bar: Bar,
    close_ms: i64,
    job: Delivery,
}

/// Replay `feeders` in one global, non-decreasing timestamp order.
///
/// Each step checks `control` without blocking. `Rebuild(g)` with `g` above
/// the last applied generation (or an empty working set) re-reads the feeder
/// set from `make_feeders` and sorts it; otherwise the feeder advanced in the
/// previous step is re-inserted by binary search. The minimum feeder is then
/// popped; if it has no bar the replay is over.
///
/// The first bar of a new timestamp waits for every delivery of the previous
/// one and is delivered inline. Bars sharing the current timestamp are
/// delivered concurrently; the first failure among them ends the loop at the
/// next barrier. `Stop` ends the loop once the running batch is done.
///
/// # Errors
/// The first delivery error, or any error reading a feeder.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(name = "barfeed::hist::run", skip_all)
)]
pub async fn run_hist_feeders<F, M>(
    mut make_feeders: M,
    control: &mut mpsc::Receiver<Control>,
    ctx: &ReplayContext,
) -> Result<(), FeedError>
where
    F: HistFeeder + ?Sized + 'static,
    M: FnMut() -> Vec<SharedFeeder<F>>,
{
    let mut applied = 0_u64;
    let mut list: VecDeque<Entry<F>> = VecDeque::new();
    let mut moved: Option<Entry<F>> = None;
    let mut last_ts = i64::MIN;
    let mut reported_ms = ctx.clock.now_ms();
    let mut batch = Batch::new(ctx.max_inflight);

    loop {
        let generation = match control.try_recv() {
            Ok(Control::Stop) => {
                #[cfg(feature = "tracing")]
                tracing::info!(target: "barfeed::hist", "stop requested");
                return batch.wait().await;
            }
            Ok(Control::Rebuild(g)) => g,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => 0,
        };

        if generation > applied || (list.is_empty() && moved.is_none()) {
            applied = applied.max(generation);
            moved = None;
            list.clear();
            for feeder in make_feeders() {
                list.push_back(Entry::load(feeder).await);
            }
            sort_all(&mut list);
            #[cfg(feature = "tracing")]
            tracing::debug!(target: "barfeed::hist", generation = applied, feeders = list.len(), "merge order rebuilt");
        } else if let Some(entry) = moved.take() {
            insert_sorted(&mut list, entry);
        }

        let Some(mut entry) = list.pop_front() else {
            break;
        };
        let pulled = match pull(&mut entry).await {
            Ok(Some(p)) => p,
            Ok(None) => break,
            Err(e) => {
                batch.wait().await?;
                return Err(e);
            }
        };
        moved = Some(entry);

        if pulled.bar.ts < last_ts {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                target: "barfeed::hist",
                ts = pulled.bar.ts,
                last_ts,
                "skipping bar older than the current time slice"
            );
            continue;
        }
        if pulled.bar.ts > last_ts {
            // Deliveries of the previous slice must not see the next close.
            batch.wait().await?;
            ctx.clock.advance_to(pulled.close_ms);
            let now = ctx.clock.now_ms();
            let secs = (now - reported_ms) / 1000;
            if secs > 0 {
                ctx.progress
                    .advance(ProgressPhase::Replay, u64::try_from(secs).unwrap_or(0));
                reported_ms += secs * 1000;
            }
            deliver(pulled.job.sink.as_ref(), &pulled.job.events).await?;
            last_ts = pulled.bar.ts;
        } else {
            ctx.clock.advance_to(pulled.close_ms);
            batch.spawn(pulled.job).await;
        }
    }
    batch.wait().await
}

/// Pull, commit and fold the next bar of `entry`, refreshing its key.
async fn pull<F>(entry: &mut Entry<F>) -> Result<Option<Pulled>, FeedError>
where
    F: HistFeeder + ?Sized,
{
    let mut feeder = entry.feeder.lock().await;
    let Some(bar) = feeder.pull_next_bar().await? else {
        return Ok(None);
    };
    feeder.advance_cursor().await?;
    let close_ms = feeder
        .states()
        .first()
        .map_or(bar.ts, |s| bar.close_ms(s.timeframe));
    let events = feeder.fold_bar(&bar)?;
    let sink = feeder.sink();
    entry.key.next_ms = feeder.next_due_ms();
    Ok(Some(Pulled {
        bar,
        close_ms,
        job: Delivery { sink, events },
    }))
}
