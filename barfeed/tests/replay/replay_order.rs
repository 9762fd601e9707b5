use std::sync::Arc;

use barfeed::control;
use barfeed::{ReplayContext, run_hist_feeders};
use barfeed_core::{BarSink, Clock, Feeder, NoProgress, ReplayClock, Timeframe};
use barfeed_mock::fixtures::{bar, series, sym};
use barfeed_mock::{RecordingSink, VecFeeder};

use crate::helpers::*;

fn ctx(start_ms: i64, inflight: usize) -> ReplayContext {
    ReplayContext::new(Arc::new(ReplayClock::new(start_ms)), Arc::new(NoProgress))
        .with_max_inflight(inflight)
}

#[tokio::test]
async fn merges_feeders_by_timestamp_then_symbol() {
    let sink = Arc::new(RecordingSink::new());
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    // ETH trades every minute, SOL every other minute, BTC with a late start.
    let eth = series(T0, Timeframe::M1, 6, 100.0);
    let sol: Vec<_> = (0..3).map(|i| bar(T0 + 2 * i * MIN, 20.0)).collect();
    let btc: Vec<_> = (2..6).map(|i| bar(T0 + i * MIN, 40_000.0)).collect();
    let feeders = shared_all(vec![
        VecFeeder::new(sym(SOL), &[Timeframe::M1], sol, Arc::clone(&dyn_sink)),
        VecFeeder::new(sym(ETH), &[Timeframe::M1], eth, Arc::clone(&dyn_sink)),
        VecFeeder::new(sym(BTC), &[Timeframe::M1], btc, Arc::clone(&dyn_sink)),
    ]);
    let (_tx, mut rx) = control::channel(4);
    let ctx = ctx(T0, 1);

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx)
        .await
        .unwrap();

    let got: Vec<(i64, String)> = sink
        .events()
        .iter()
        .map(|e| (e.bar.ts, e.symbol.to_string()))
        .collect();
    let mut want = got.clone();
    want.sort();
    assert_eq!(got, want, "order must be (timestamp, symbol)");
    assert_eq!(got.len(), 6 + 3 + 4);
    assert_eq!(got[0], (T0, ETH.to_string()));
    assert_eq!(got[1], (T0, SOL.to_string()));
    // Clock ends at the close of the last bar.
    assert_eq!(ctx.clock.now_ms(), T0 + 6 * MIN);
}

#[tokio::test]
async fn higher_timeframes_follow_their_source_bar() {
    let sink = Arc::new(RecordingSink::new());
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    let feeders = shared_all(vec![VecFeeder::new(
        sym(BTC),
        &[Timeframe::M1, Timeframe::M5],
        series(T0, Timeframe::M1, 10, 50.0),
        dyn_sink,
    )]);
    let (_tx, mut rx) = control::channel(4);

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx(T0, 4))
        .await
        .unwrap();

    let events = sink.events();
    let five: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.timeframe == Timeframe::M5)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(five.len(), 2);
    // Each 5m bar is delivered right after the 1m bar that closed it.
    for i in five {
        assert_eq!(events[i - 1].timeframe, Timeframe::M1);
        assert_eq!(events[i - 1].bar.ts, events[i].bar.ts + 4 * MIN);
    }
}

#[tokio::test]
async fn exhausted_feeder_sorts_last_and_ends_the_loop() {
    let sink = Arc::new(RecordingSink::new());
    let dyn_sink: Arc<dyn BarSink> = sink.clone();
    let feeders = shared_all(vec![
        VecFeeder::new(sym(BTC), &[Timeframe::M1], series(T0, Timeframe::M1, 2, 1.0), Arc::clone(&dyn_sink)),
        VecFeeder::new(sym(ETH), &[Timeframe::M1], series(T0, Timeframe::M1, 5, 1.0), Arc::clone(&dyn_sink)),
        VecFeeder::new(sym(SOL), &[Timeframe::M1], Vec::new(), Arc::clone(&dyn_sink)),
    ]);
    let (_tx, mut rx) = control::channel(4);

    run_hist_feeders(|| feeders.clone(), &mut rx, &ctx(T0, 2))
        .await
        .unwrap();

    assert_eq!(sink.bars_of(&sym(BTC), Timeframe::M1).len(), 2);
    assert_eq!(sink.bars_of(&sym(ETH), Timeframe::M1).len(), 5);
    assert!(sink.bars_of(&sym(SOL), Timeframe::M1).is_empty());
    let btc = feeders[0].lock().await;
    assert_eq!(btc.position(), 2);
    assert_eq!(btc.next_due_ms(), barfeed_core::EXHAUSTED_MS);
}

#[tokio::test]
async fn empty_feeder_set_returns_immediately() {
    let (_tx, mut rx) = control::channel(1);
    let res = run_hist_feeders(Vec::<barfeed_core::SharedFeeder<VecFeeder>>::new, &mut rx, &ctx(T0, 1)).await;
    assert!(res.is_ok());
}
