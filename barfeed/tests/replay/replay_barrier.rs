use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use barfeed::control;
use barfeed::{ReplayContext, run_hist_feeders};
use barfeed_core::{BarEvent, BarSink, Clock, FeedError, NoProgress, ReplayClock, Timeframe};
use barfeed_mock::fixtures::{series, sym};
use barfeed_mock::{RecordingSink, VecFeeder};
use futures::FutureExt;

use crate::helpers::*;

fn four_feeders(sink: &Arc<RecordingSink>, n: usize) -> Vec<barfeed_core::SharedFeeder<VecFeeder>> {
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    shared_all(
        ["ADA/USDT", BTC, ETH, SOL]
            .iter()
            .map(|s| {
                VecFeeder::new(
                    sym(s),
                    &[Timeframe::M1],
                    series(T0, Timeframe::M1, n, 10.0),
                    Arc::clone(&dyn_sink),
                )
            })
            .collect(),
    )
}

#[tokio::test(start_paused = true)]
async fn same_timestamp_bars_run_concurrently_behind_a_barrier() {
    let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(10)));
    let max_seen = Arc::new(AtomicI64::new(i64::MIN));
    let seen = Arc::clone(&max_seen);
    // Every delivery must see no bar from a later time slice already delivered.
    sink.set_hook(Arc::new(move |ev: BarEvent| {
        let prev = seen.fetch_max(ev.bar.ts, Ordering::SeqCst);
        async move {
            if prev > ev.bar.ts {
                return Err(FeedError::Other(format!("{} delivered after {prev}", ev.bar.ts)));
            }
            Ok(())
        }
        .boxed()
    }));
    let feeders = four_feeders(&sink, 5);
    let (_tx, mut rx) = control::channel(4);
    let ctx = ReplayContext::new(Arc::new(ReplayClock::new(T0)), Arc::new(NoProgress));

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx)
        .await
        .unwrap();

    assert_eq!(sink.len(), 20);
    // The first bar of a slice is delivered inline, the other three together.
    assert_eq!(sink.peak_concurrency(), 3);
    let ts: Vec<i64> = sink.events().iter().map(|e| e.bar.ts).collect();
    assert!(ts.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn inflight_limit_bounds_same_timestamp_fanout() {
    let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(10)));
    let feeders = four_feeders(&sink, 3);
    let (_tx, mut rx) = control::channel(4);
    let ctx = ReplayContext::new(Arc::new(ReplayClock::new(T0)), Arc::new(NoProgress))
        .with_max_inflight(2);

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx)
        .await
        .unwrap();

    assert_eq!(sink.len(), 12);
    assert_eq!(sink.peak_concurrency(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_deliveries_see_their_own_slice_on_the_clock() {
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ReplayClock::new(T0));
    let seen: Arc<std::sync::Mutex<Vec<(i64, i64)>>> = Arc::default();
    let (hook_clock, hook_seen) = (Arc::clone(&clock), Arc::clone(&seen));
    sink.set_hook(Arc::new(move |ev: BarEvent| {
        let clock = Arc::clone(&hook_clock);
        let seen = Arc::clone(&hook_seen);
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            seen.lock()
                .expect("mutex poisoned")
                .push((ev.bar.ts, clock.now_ms()));
            Ok::<(), FeedError>(())
        }
        .boxed()
    }));
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    let feeders = shared_all(
        [BTC, ETH]
            .iter()
            .map(|s| {
                VecFeeder::new(
                    sym(s),
                    &[Timeframe::M1],
                    series(T0, Timeframe::M1, 2, 10.0),
                    Arc::clone(&dyn_sink),
                )
            })
            .collect(),
    );
    let (_tx, mut rx) = control::channel(4);
    let ctx = ReplayContext::new(Arc::clone(&clock), Arc::new(NoProgress));

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx)
        .await
        .unwrap();

    let seen = seen.lock().expect("mutex poisoned").clone();
    assert_eq!(seen.len(), 4);
    for (bar_ts, now) in seen {
        assert_eq!(now, bar_ts + MIN, "bar at {bar_ts} saw the clock at {now}");
    }
}
