use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use barfeed::control::{self, Control};
use barfeed::{ReplayContext, run_hist_feeders};
use barfeed_core::{BarEvent, BarSink, FeedError, NoProgress, ReplayClock, Timeframe};
use barfeed_mock::fixtures::{series, sym};
use barfeed_mock::{RecordingSink, VecFeeder};
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::helpers::*;

fn pair(sink: &Arc<RecordingSink>) -> Vec<barfeed_core::SharedFeeder<VecFeeder>> {
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    shared_all(vec![
        VecFeeder::new(sym(BTC), &[Timeframe::M1], series(T0, Timeframe::M1, 5, 1.0), Arc::clone(&dyn_sink)),
        VecFeeder::new(sym(ETH), &[Timeframe::M1], series(T0, Timeframe::M1, 5, 2.0), Arc::clone(&dyn_sink)),
    ])
}

fn ctx() -> ReplayContext {
    ReplayContext::new(Arc::new(ReplayClock::new(T0)), Arc::new(NoProgress))
}

#[tokio::test]
async fn stale_generations_do_not_rebuild() {
    let sink = Arc::new(RecordingSink::new());
    let feeders = pair(&sink);
    let (tx, mut rx) = mpsc::channel(8);
    for g in [1, 1, 0] {
        tx.send(Control::Rebuild(g)).await.unwrap();
    }
    let calls = AtomicUsize::new(0);

    run_hist_feeders(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            feeders.clone()
        },
        &mut rx,
        &ctx(),
    )
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.len(), 10);
}

#[tokio::test]
async fn newer_generation_rebuilds_without_losing_bars() {
    let sink = Arc::new(RecordingSink::new());
    let feeders = pair(&sink);
    let (tx, mut rx) = mpsc::channel(8);
    for g in [1, 2, 2, 3] {
        tx.send(Control::Rebuild(g)).await.unwrap();
    }
    let calls = AtomicUsize::new(0);

    run_hist_feeders(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            feeders.clone()
        },
        &mut rx,
        &ctx(),
    )
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let mut got: Vec<(i64, String)> = sink
        .events()
        .iter()
        .map(|e| (e.bar.ts, e.symbol.to_string()))
        .collect();
    assert_eq!(got.len(), 10);
    got.dedup();
    assert_eq!(got.len(), 10, "no bar may be delivered twice");
}

#[tokio::test]
async fn stop_before_start_delivers_nothing() {
    let sink = Arc::new(RecordingSink::new());
    let feeders = pair(&sink);
    let (tx, mut rx) = control::channel(2);
    tx.stop().unwrap();

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx())
        .await
        .unwrap();

    assert!(sink.is_empty());
}

#[tokio::test]
async fn stop_from_the_sink_ends_after_the_current_step() {
    let sink = Arc::new(RecordingSink::new());
    let feeders = pair(&sink);
    let (tx, mut rx) = control::channel(2);
    let tx = Arc::new(tx);
    let stopper = Arc::clone(&tx);
    sink.set_hook(Arc::new(move |_ev: BarEvent| {
        let _ = stopper.stop();
        async { Ok::<(), FeedError>(()) }.boxed()
    }));

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx())
        .await
        .unwrap();

    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn full_control_buffer_is_reported() {
    let (tx, _rx) = control::channel(2);
    assert_eq!(tx.rebuild().unwrap(), 1);
    assert_eq!(tx.rebuild().unwrap(), 2);
    let err = tx.rebuild().unwrap_err();
    assert!(matches!(err, FeedError::ControlChannel(_)));
    // The generation still moved so a later signal supersedes the lost one.
    assert_eq!(tx.generation(), 3);
}

#[tokio::test]
async fn dropped_sender_reads_as_no_signal() {
    let sink = Arc::new(RecordingSink::new());
    let feeders = pair(&sink);
    let (tx, mut rx) = control::channel(2);
    drop(tx);

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx())
        .await
        .unwrap();

    assert_eq!(sink.len(), 10);
}
