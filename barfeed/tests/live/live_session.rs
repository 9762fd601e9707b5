use std::time::Duration;

use barfeed::FeedBuilder;
use barfeed_core::{BackoffConfig, FeedError, Timeframe, WatchKind};
use barfeed_mock::TransportController;
use barfeed_mock::fixtures::{bar, sym};

use crate::helpers::*;

const PATIENCE: Duration = Duration::from_secs(5);

fn quick_backoff() -> BackoffConfig {
    BackoffConfig {
        min_backoff_ms: 10,
        max_backoff_ms: 40,
        factor: 2,
        jitter_percent: 0,
    }
}

/// Wait for `connects` attempts and the re-watch that follows a reconnect.
async fn rewatched(ctrl: &TransportController, connects: usize, watch_calls: usize) -> bool {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while tokio::time::Instant::now() < deadline {
        if ctrl.connects().await >= connects
            && ctrl.watched(WatchKind::Ohlcv).await.len() >= watch_calls
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    false
}

async fn btc_rig(builder: FeedBuilder) -> LiveRig {
    let rig = live_rig(builder.venue("mock", "spot"), T0).await;
    rig.provider
        .subscribe(&request(&[BTC], &[(Timeframe::M1, 0)]), false)
        .await
        .unwrap();
    rig.clock.set_ms(T0 + 10 * MIN);
    rig
}

#[tokio::test(start_paused = true)]
async fn frames_flow_until_stopped() {
    let rig = btc_rig(FeedBuilder::new()).await;
    let handle = rig.provider.run();
    assert!(rig.ctrl.wait_connected(PATIENCE).await);

    let msg = ohlcv(BTC, 60, 60, vec![bar(T0, 1.0), bar(T0 + MIN, 2.0)]);
    assert!(rig.ctrl.push_message(&msg).await);
    assert!(wait_for(|| rig.sink.len() == 2, PATIENCE).await);

    handle.stop().await.unwrap();
    assert!(!rig.ctrl.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn bad_frames_are_dropped_and_the_stream_goes_on() {
    let rig = btc_rig(FeedBuilder::new()).await;
    let handle = rig.provider.run();
    assert!(rig.ctrl.wait_connected(PATIENCE).await);

    assert!(rig.ctrl.push_frame(b"garbage".to_vec()).await);
    assert!(rig.ctrl.push_error(FeedError::Decode("truncated".into())).await);
    let msg = ohlcv(BTC, 60, 60, vec![bar(T0, 1.0)]);
    assert!(rig.ctrl.push_message(&msg).await);
    assert!(wait_for(|| rig.sink.len() == 1, PATIENCE).await);
    assert!(!handle.is_finished());

    // Anything else ends the session with that error.
    assert!(rig.ctrl.push_error(FeedError::Other("server gone mad".into())).await);
    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, FeedError::Other(_)));
}

#[tokio::test(start_paused = true)]
async fn overflowing_bar_does_not_stop_the_worker() {
    let rig = btc_rig(FeedBuilder::new()).await;
    let handle = rig.provider.run();
    assert!(rig.ctrl.wait_connected(PATIENCE).await);

    let huge = ohlcv(BTC, 60, 5, vec![bar(i64::MAX - 1_000, 1.0)]);
    assert!(rig.ctrl.push_message(&huge).await);
    let good = ohlcv(BTC, 60, 60, vec![bar(T0, 1.0)]);
    assert!(rig.ctrl.push_message(&good).await);

    assert!(wait_for(|| rig.sink.len() == 1, PATIENCE).await);
    assert_eq!(stamps(&rig.sink.bars_of(&sym(BTC), Timeframe::M1)), vec![T0]);
    assert!(!handle.is_finished());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn closed_stream_without_backoff_ends_the_session() {
    let rig = btc_rig(FeedBuilder::new()).await;
    let handle = rig.provider.run();
    assert!(rig.ctrl.wait_connected(PATIENCE).await);

    rig.ctrl.disconnect().await;
    handle.join().await.unwrap();
    assert_eq!(rig.ctrl.connects().await, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_first_connect_without_backoff_is_returned() {
    let rig = btc_rig(FeedBuilder::new()).await;
    rig.ctrl.fail_next_connects(1).await;

    let err = rig.provider.run().join().await.unwrap_err();
    assert!(matches!(err, FeedError::Transport(_)));
}

#[tokio::test(start_paused = true)]
async fn reconnects_with_backoff_and_rewatches() {
    let rig = btc_rig(FeedBuilder::new().backoff(quick_backoff())).await;
    let handle = rig.provider.run();
    assert!(rig.ctrl.wait_connected(PATIENCE).await);

    let msg = ohlcv(BTC, 60, 60, vec![bar(T0, 1.0), bar(T0 + MIN, 2.0)]);
    assert!(rig.ctrl.push_message(&msg).await);
    assert!(wait_for(|| rig.sink.len() == 2, PATIENCE).await);

    rig.ctrl.fail_next_connects(2).await;
    rig.ctrl.disconnect().await;
    assert!(rewatched(&rig.ctrl, 4, 2).await);

    let watched = rig.ctrl.watched(WatchKind::Ohlcv).await;
    assert_eq!(watched.len(), 2);
    assert_eq!(watched[1].symbol, sym(BTC));
    assert_eq!(watched[1].since, Some(T0 + 2 * MIN));

    // Bars keep flowing on the new connection.
    let msg = ohlcv(BTC, 60, 60, vec![bar(T0 + 2 * MIN, 3.0)]);
    assert!(rig.ctrl.push_message(&msg).await);
    assert!(wait_for(|| rig.sink.len() == 3, PATIENCE).await);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_the_backoff_wait() {
    let backoff = BackoffConfig {
        min_backoff_ms: 60_000,
        max_backoff_ms: 60_000,
        factor: 1,
        jitter_percent: 0,
    };
    let rig = btc_rig(FeedBuilder::new().backoff(backoff)).await;
    rig.ctrl.fail_next_connects(usize::MAX).await;
    let handle = rig.provider.run();
    tokio::time::sleep(Duration::from_millis(5)).await;

    handle.stop().await.unwrap();
    assert_eq!(rig.ctrl.connects().await, 1);
}
