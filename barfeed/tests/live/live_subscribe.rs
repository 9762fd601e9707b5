use barfeed::FeedBuilder;
use barfeed_core::{Timeframe, WatchJob, WatchKind};
use barfeed_mock::fixtures::{bar, series, sym};

use crate::helpers::*;

fn job(symbol: &str, timeframe: Timeframe, since: Option<i64>) -> WatchJob {
    WatchJob {
        symbol: sym(symbol),
        timeframe,
        since,
    }
}

#[tokio::test]
async fn build_subscribes_the_price_topic() {
    let rig = live_rig(FeedBuilder::new().venue("mock", "spot"), T0).await;
    assert_eq!(rig.ctrl.topics().await, vec!["price_mock_spot".to_string()]);
    assert!(rig.ctrl.calls().await.is_empty());
}

#[tokio::test]
async fn new_feeders_are_watched_from_their_resume_point() {
    let builder = FeedBuilder::new()
        .venue("mock", "spot")
        .book_symbols(vec![BTC.to_string()]);
    // Mid-bar: the bar in progress is still due.
    let rig = live_rig(builder, T0 + 30_000).await;
    rig.store
        .insert(&sym(BTC), Timeframe::M1, series(T0 - 10 * MIN, Timeframe::M1, 10, 1.0));

    let out = rig
        .provider
        .subscribe(&request(&[BTC, ETH], &[(Timeframe::M1, 3), (Timeframe::H1, 0)]), false)
        .await
        .unwrap();

    assert_eq!(out.new_feeders, vec![sym(BTC), sym(ETH)]);
    assert_eq!(
        rig.ctrl.watched(WatchKind::Ohlcv).await,
        vec![job(BTC, Timeframe::M1, Some(T0)), job(ETH, Timeframe::M1, Some(T0))]
    );
    assert_eq!(
        rig.ctrl.watched(WatchKind::Book).await,
        vec![job(BTC, Timeframe::M1, None)]
    );
    let warm = rig.sink.warm();
    let btc = warm
        .iter()
        .find(|(s, tf, _)| s == &sym(BTC) && *tf == Timeframe::M1)
        .unwrap();
    assert_eq!(stamps(&btc.2), vec![T0 - 3 * MIN, T0 - 2 * MIN, T0 - MIN]);

    // A known symbol gaining a timeframe is not watched again.
    rig.provider
        .subscribe(&request(&[BTC], &[(Timeframe::M1, 0), (Timeframe::M5, 0)]), false)
        .await
        .unwrap();
    assert_eq!(rig.ctrl.watched(WatchKind::Ohlcv).await.len(), 2);
}

#[tokio::test]
async fn removed_feeders_are_unwatched() {
    let rig = live_rig(FeedBuilder::new().venue("mock", "spot"), T0).await;
    rig.provider
        .subscribe(&request(&[BTC, ETH, SOL], &[(Timeframe::M1, 0)]), false)
        .await
        .unwrap();

    let out = rig
        .provider
        .subscribe(&request(&[ETH], &[(Timeframe::M1, 0)]), true)
        .await
        .unwrap();
    assert_eq!(out.removed, vec![sym(BTC), sym(SOL)]);
    assert_eq!(rig.ctrl.unwatched(WatchKind::Ohlcv).await, vec![sym(BTC), sym(SOL)]);

    let gone = rig.provider.unsubscribe(&[sym(ETH), sym(BTC)]).await.unwrap();
    assert_eq!(gone, vec![sym(ETH)]);
    assert_eq!(
        rig.ctrl.unwatched(WatchKind::Ohlcv).await,
        vec![sym(BTC), sym(SOL), sym(ETH)]
    );
}

#[tokio::test]
async fn resubscribe_rewatches_from_current_cursors() {
    let rig = live_rig(FeedBuilder::new().venue("mock", "spot"), T0).await;
    rig.provider
        .subscribe(&request(&[BTC], &[(Timeframe::M1, 0)]), false)
        .await
        .unwrap();
    rig.clock.set_ms(T0 + 5 * MIN);
    rig.provider
        .handle_message(&ohlcv(BTC, 60, 60, vec![bar(T0, 1.0), bar(T0 + MIN, 2.0)]))
        .await
        .unwrap();
    rig.ctrl.clear_topics().await;

    rig.provider.resubscribe().await.unwrap();

    assert_eq!(rig.ctrl.topics().await, vec!["price_mock_spot".to_string()]);
    assert_eq!(
        rig.ctrl.watched(WatchKind::Ohlcv).await,
        vec![job(BTC, Timeframe::M1, Some(T0)), job(BTC, Timeframe::M1, Some(T0 + 2 * MIN))]
    );
}
