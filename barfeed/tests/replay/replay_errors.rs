use std::sync::Arc;
use std::time::Duration;

use barfeed::control;
use barfeed::{ReplayContext, run_hist_feeders};
use barfeed_core::{BarSink, FeedError, NoProgress, ReplayClock, Timeframe};
use barfeed_mock::fixtures::{series, sym};
use barfeed_mock::{RecordingSink, VecFeeder};

use crate::helpers::*;

fn ctx() -> ReplayContext {
    ReplayContext::new(Arc::new(ReplayClock::new(T0)), Arc::new(NoProgress))
}

#[tokio::test(start_paused = true)]
async fn delivery_error_stops_before_the_next_time_slice() {
    let sink = Arc::new(
        RecordingSink::new()
            .with_delay(Duration::from_millis(5))
            .fail_on(sym(ETH), T0 + 2 * MIN),
    );
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    let feeders = shared_all(
        [BTC, ETH, SOL]
            .iter()
            .map(|s| {
                VecFeeder::new(
                    sym(s),
                    &[Timeframe::M1],
                    series(T0, Timeframe::M1, 6, 1.0),
                    Arc::clone(&dyn_sink),
                )
            })
            .collect(),
    );
    let (_tx, mut rx) = control::channel(2);

    let err = run_hist_feeders(|| feeders.clone(), &mut rx, &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::Delivery { .. }), "{err:?}");
    assert!(sink.events().iter().all(|e| e.bar.ts <= T0 + 2 * MIN));
}

#[tokio::test]
async fn feeder_read_error_is_returned() {
    let sink = Arc::new(RecordingSink::new());
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    let feeders = shared_all(vec![
        VecFeeder::new(sym(BTC), &[Timeframe::M1], series(T0, Timeframe::M1, 4, 1.0), dyn_sink)
            .failing_at(T0 + 3 * MIN),
    ]);
    let (_tx, mut rx) = control::channel(2);

    let err = run_hist_feeders(|| feeders.clone(), &mut rx, &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::Data(_)));
    assert_eq!(sink.len(), 3);
}
