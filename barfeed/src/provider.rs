//! Subscription manager shared by the replay and live providers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use barfeed_core::{
    Clock, FeedConfig, FeedError, Feeder, ProgressSink, ResumeKey, SharedFeeder, Symbol, Timeframe,
};
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::control::{self, Control, ControlSender};
use crate::warmup::{WarmJob, run_warm_jobs};

/// Creates the feeder for a symbol seen for the first time, already
/// subscribed to the given timeframes.
pub type FeederFactory<F> = Arc<
    dyn Fn(Symbol, Vec<Timeframe>) -> BoxFuture<'static, Result<SharedFeeder<F>, FeedError>>
        + Send
        + Sync,
>;

/// Symbol to (timeframe to warm-up bar count).
pub type SubscribeRequest = BTreeMap<Symbol, BTreeMap<Timeframe, usize>>;

/// Result of [`Provider::subscribe`].
#[derive(Debug, Default, Clone)]
pub struct SubscribeOutcome {
    /// Symbols that are new to the merge order: created now, or whose smallest
    /// timeframe changed.
    pub new_feeders: Vec<Symbol>,
    /// Resume timestamp per symbol and smallest timeframe.
    pub since: HashMap<ResumeKey, i64>,
    /// Symbols dropped because they were absent from the request.
    pub removed: Vec<Symbol>,
    /// Whether the feeder set or any subscription changed shape.
    pub changed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Retired {
    timeframe: Timeframe,
    next_ms: i64,
}

/// What a subscribe call changed before it failed.
struct Undo<F: ?Sized> {
    created: Vec<(Symbol, Option<Retired>)>,
    resubscribed: Vec<(SharedFeeder<F>, Vec<Timeframe>)>,
}

impl<F: ?Sized> Default for Undo<F> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            resubscribed: Vec::new(),
        }
    }
}

/// Owns the feeders of one session keyed by symbol.
///
/// At most one feeder exists per symbol. Structural changes are announced to
/// the replay loop with [`mark_dirty`](Self::mark_dirty), which bumps a
/// generation counter the loop compares against the last one it applied.
pub struct Provider<F: ?Sized> {
    holders: Mutex<BTreeMap<Symbol, SharedFeeder<F>>>,
    retired: Mutex<HashMap<Symbol, Retired>>,
    factory: FeederFactory<F>,
    control: ControlSender,
    control_rx: Mutex<Option<mpsc::Receiver<Control>>>,
    sub_lock: tokio::sync::Mutex<()>,
    workers: usize,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressSink>,
}

impl<F> Provider<F>
where
    F: Feeder + ?Sized + 'static,
{
    /// Create an empty provider.
    ///
    /// `clock` supplies the as-of time for warm-up; `progress` observes it.
    #[must_use]
    pub fn new(
        factory: FeederFactory<F>,
        cfg: &FeedConfig,
        clock: Arc<dyn Clock>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let (control, rx) = control::channel(cfg.control_capacity);
        Self {
            holders: Mutex::new(BTreeMap::new()),
            retired: Mutex::new(HashMap::new()),
            factory,
            control,
            control_rx: Mutex::new(Some(rx)),
            sub_lock: tokio::sync::Mutex::new(()),
            workers: cfg.workers(),
            clock,
            progress,
        }
    }

    /// Add or update subscriptions and warm up what is new.
    ///
    /// Unknown symbols get a feeder from the factory and a warm-up of every
    /// requested timeframe. Known symbols are resubscribed and warm up only the
    /// timeframes they gained; their current cursor is kept as resume point.
    /// With `drop_others`, held symbols absent from `request` are removed.
    ///
    /// A symbol removed earlier and now requested again resumes from its old
    /// cursor when its smallest timeframe is unchanged, unless warm-up already
    /// lands later.
    ///
    /// Calls are serialized. A sink must not subscribe from `on_warm_bars`.
    ///
    /// On error, feeders created by this call are dropped again and known
    /// ones get their previous timeframes back; removals stay in effect.
    ///
    /// # Errors
    /// `InvalidArg` if a symbol requests no timeframes; otherwise the factory's
    /// or the first warm-up error.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "barfeed::provider::subscribe",
            skip(self, request),
            fields(symbols = request.len())
        )
    )]
    pub async fn subscribe(
        &self,
        request: &SubscribeRequest,
        drop_others: bool,
    ) -> Result<SubscribeOutcome, FeedError> {
        if let Some((symbol, _)) = request.iter().find(|(_, counts)| counts.is_empty()) {
            return Err(FeedError::InvalidArg(format!(
                "no timeframes requested for {symbol}"
            )));
        }
        let _serial = self.sub_lock.lock().await;

        let mut undo = Undo::default();
        match self.apply(request, drop_others, &mut undo).await {
            Ok(out) => Ok(out),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    target: "barfeed::provider",
                    error = %e,
                    created = undo.created.len(),
                    "subscribe failed, rolling back"
                );
                self.rollback(undo).await;
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        request: &SubscribeRequest,
        drop_others: bool,
        undo: &mut Undo<F>,
    ) -> Result<SubscribeOutcome, FeedError> {
        let mut out = SubscribeOutcome::default();
        let mut jobs = Vec::new();
        let mut kept_since = HashMap::new();
        let mut revived = HashMap::new();

        for (symbol, counts) in request {
            let tfs: Vec<Timeframe> = counts.keys().copied().collect();
            let Some(feeder) = self.get(symbol) else {
                let feeder = (self.factory)(symbol.clone(), tfs).await?;
                let min_tf = feeder.lock().await.states().first().map(|s| s.timeframe);
                let retired = self.retired.lock().expect("mutex poisoned").remove(symbol);
                if let Some(r) = retired
                    && Some(r.timeframe) == min_tf
                {
                    revived.insert(ResumeKey::new(symbol.clone(), r.timeframe), r.next_ms);
                }
                self.holders
                    .lock()
                    .expect("mutex poisoned")
                    .insert(symbol.clone(), Arc::clone(&feeder));
                undo.created.push((symbol.clone(), retired));
                out.new_feeders.push(symbol.clone());
                jobs.push(WarmJob {
                    symbol: symbol.clone(),
                    feeder,
                    counts: counts.clone(),
                });
                continue;
            };

            let mut guard = feeder.lock().await;
            let before: Vec<Timeframe> = guard.states().iter().map(|s| s.timeframe).collect();
            let old_min = before.first().copied();
            let added = guard.sub_timeframes(&tfs, drop_others);
            let cursor = guard.states().first().map(|s| (s.timeframe, s.next_ms));
            drop(guard);

            let min_changed = cursor.map(|c| c.0) != old_min;
            if min_changed {
                out.new_feeders.push(symbol.clone());
            }
            // Without a warm-up the current cursor is the only resume point.
            if (!min_changed || added.is_empty())
                && let Some((tf, next_ms)) = cursor
                && next_ms > 0
            {
                kept_since.insert(ResumeKey::new(symbol.clone(), tf), next_ms);
            }
            if !added.is_empty() {
                let counts = counts
                    .iter()
                    .filter(|(tf, _)| added.contains(tf))
                    .map(|(tf, n)| (*tf, *n))
                    .collect();
                undo.resubscribed.push((Arc::clone(&feeder), before));
                jobs.push(WarmJob {
                    symbol: symbol.clone(),
                    feeder,
                    counts,
                });
                out.changed = true;
            }
        }

        if drop_others {
            let gone: Vec<(Symbol, SharedFeeder<F>)> = {
                let mut holders = self.holders.lock().expect("mutex poisoned");
                let names: Vec<Symbol> = holders
                    .keys()
                    .filter(|s| !request.contains_key(*s))
                    .cloned()
                    .collect();
                names
                    .into_iter()
                    .filter_map(|s| holders.remove(&s).map(|f| (s, f)))
                    .collect()
            };
            out.removed = self.retire(gone).await;
        }
        out.changed |= !out.new_feeders.is_empty() || !out.removed.is_empty();

        let as_of = self.clock.now_ms();
        let mut since = run_warm_jobs(jobs, self.workers, as_of, Arc::clone(&self.progress)).await?;
        for (key, next_ms) in revived {
            since
                .entry(key)
                .and_modify(|s| *s = (*s).max(next_ms))
                .or_insert(next_ms);
        }
        since.extend(kept_since);
        out.since = since;

        #[cfg(feature = "tracing")]
        tracing::info!(
            target: "barfeed::provider",
            new = out.new_feeders.len(),
            removed = out.removed.len(),
            held = self.len(),
            "subscriptions updated"
        );
        Ok(out)
    }

    /// Forget the feeders a failed subscribe created and restore the
    /// timeframes of the ones it resubscribed, so a retry warms them again.
    async fn rollback(&self, undo: Undo<F>) {
        for (symbol, retired) in undo.created {
            self.holders.lock().expect("mutex poisoned").remove(&symbol);
            if let Some(r) = retired {
                self.retired.lock().expect("mutex poisoned").insert(symbol, r);
            }
        }
        for (feeder, before) in undo.resubscribed {
            feeder.lock().await.sub_timeframes(&before, true);
        }
    }

    /// Remove feeders; returns the symbols that were actually held.
    pub async fn unsubscribe(&self, symbols: &[Symbol]) -> Vec<Symbol> {
        let _serial = self.sub_lock.lock().await;
        let gone: Vec<(Symbol, SharedFeeder<F>)> = {
            let mut holders = self.holders.lock().expect("mutex poisoned");
            symbols
                .iter()
                .filter_map(|s| holders.remove(s).map(|f| (s.clone(), f)))
                .collect()
        };
        self.retire(gone).await
    }

    async fn retire(&self, gone: Vec<(Symbol, SharedFeeder<F>)>) -> Vec<Symbol> {
        let mut names = Vec::with_capacity(gone.len());
        for (symbol, feeder) in gone {
            let cursor = feeder
                .lock()
                .await
                .states()
                .first()
                .map(|s| (s.timeframe, s.next_ms));
            if let Some((timeframe, next_ms)) = cursor
                && next_ms > 0
            {
                self.retired
                    .lock()
                    .expect("mutex poisoned")
                    .insert(symbol.clone(), Retired { timeframe, next_ms });
            }
            names.push(symbol);
        }
        names
    }

    /// Announce a structural change to the replay loop.
    ///
    /// # Errors
    /// `ControlChannel` if the loop is not draining its signals.
    pub fn mark_dirty(&self) -> Result<u64, FeedError> {
        self.control.rebuild()
    }

    /// Ask the replay loop to stop after its current batch.
    ///
    /// # Errors
    /// `ControlChannel` if the signal cannot be queued.
    pub fn terminate(&self) -> Result<(), FeedError> {
        self.control.stop()
    }

    /// Last generation announced by [`mark_dirty`](Self::mark_dirty).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.control.generation()
    }

    /// Hand the control receiver to a loop. `None` while a loop owns it.
    pub fn take_control(&self) -> Option<mpsc::Receiver<Control>> {
        self.control_rx.lock().expect("mutex poisoned").take()
    }

    /// Give the control receiver back once a loop has exited.
    pub fn restore_control(&self, rx: mpsc::Receiver<Control>) {
        *self.control_rx.lock().expect("mutex poisoned") = Some(rx);
    }

    /// Feeder of `symbol`, if held.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<SharedFeeder<F>> {
        self.holders
            .lock()
            .expect("mutex poisoned")
            .get(symbol)
            .map(Arc::clone)
    }

    /// All held feeders ordered by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Symbol, SharedFeeder<F>)> {
        self.holders
            .lock()
            .expect("mutex poisoned")
            .iter()
            .map(|(s, f)| (s.clone(), Arc::clone(f)))
            .collect()
    }

    /// Held symbols in order.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.holders
            .lock()
            .expect("mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Number of held feeders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.holders.lock().expect("mutex poisoned").len()
    }

    /// True when no feeder is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clock used for warm-up.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Progress observer.
    #[must_use]
    pub fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }
}
