use std::collections::HashMap;

use barfeed::FeedBuilder;
use barfeed_core::{FeedError, Inbound, PriceMessage, Timeframe};
use barfeed_mock::fixtures::{bar, series, sym};

use crate::helpers::*;

async fn subscribed(symbol: &str, tfs: &[(Timeframe, usize)]) -> LiveRig {
    let rig = live_rig(FeedBuilder::new().venue("mock", "spot"), T0).await;
    rig.provider
        .subscribe(&request(&[symbol], tfs), false)
        .await
        .unwrap();
    rig
}

#[tokio::test]
async fn fast_push_buffers_the_open_bar_until_it_closes() {
    let rig = subscribed(BTC, &[(Timeframe::M1, 0)]).await;

    // 10s before the last bar closes: only the first two are final.
    rig.clock.set_ms(T0 + 2 * MIN + 50_000);
    let first = vec![bar(T0, 1.0), bar(T0 + MIN, 2.0), bar(T0 + 2 * MIN, 3.0)];
    rig.provider
        .handle_message(&ohlcv(BTC, 60, 5, first))
        .await
        .unwrap();
    assert_eq!(stamps(&rig.sink.bars_of(&sym(BTC), Timeframe::M1)), vec![T0, T0 + MIN]);

    // 2s before the next close, within half the push interval.
    rig.clock.set_ms(T0 + 4 * MIN - 2_000);
    let second = vec![bar(T0 + 2 * MIN, 9.0), bar(T0 + 3 * MIN, 4.0)];
    rig.provider
        .handle_message(&ohlcv(BTC, 60, 5, second))
        .await
        .unwrap();

    let got = rig.sink.bars_of(&sym(BTC), Timeframe::M1);
    assert_eq!(
        stamps(&got),
        vec![T0, T0 + MIN, T0 + 2 * MIN, T0 + 3 * MIN]
    );
    // The re-pushed copy of the buffered bar is the one delivered.
    assert_eq!(got[2].close, 9.0);

    // Re-sent final bars are not delivered again.
    rig.clock.set_ms(T0 + 5 * MIN - 1_000);
    rig.provider
        .handle_message(&ohlcv(BTC, 60, 5, vec![bar(T0 + 3 * MIN, 4.0), bar(T0 + 4 * MIN, 5.0)]))
        .await
        .unwrap();
    assert_eq!(rig.sink.bars_of(&sym(BTC), Timeframe::M1).len(), 5);
}

#[tokio::test]
async fn slow_push_is_final_and_aggregates_up() {
    let rig = subscribed(ETH, &[(Timeframe::M1, 0), (Timeframe::M5, 0)]).await;
    rig.clock.set_ms(T0 + 10 * MIN);
    rig.provider
        .handle_message(&ohlcv(ETH, 60, 60, series(T0, Timeframe::M1, 10, 5.0)))
        .await
        .unwrap();

    assert_eq!(rig.sink.bars_of(&sym(ETH), Timeframe::M1).len(), 10);
    assert_eq!(
        stamps(&rig.sink.bars_of(&sym(ETH), Timeframe::M5)),
        vec![T0, T0 + 5 * MIN]
    );
}

#[tokio::test]
async fn smaller_pushed_bars_build_the_feeder_timeframe() {
    let rig = subscribed(SOL, &[(Timeframe::M5, 0)]).await;
    rig.clock.set_ms(T0 + 10 * MIN);
    rig.provider
        .handle_message(&ohlcv(SOL, 60, 60, series(T0, Timeframe::M1, 10, 5.0)))
        .await
        .unwrap();

    let m5 = rig.sink.bars_of(&sym(SOL), Timeframe::M5);
    assert_eq!(stamps(&m5), vec![T0, T0 + 5 * MIN]);
    assert!(rig.sink.bars_of(&sym(SOL), Timeframe::M1).is_empty());

    // Larger pushed bars cannot be split.
    let err = rig
        .provider
        .handle_message(&ohlcv(SOL, 900, 900, vec![bar(T0 + 15 * MIN, 1.0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Data(_)));
}

#[tokio::test]
async fn other_venues_and_unknown_symbols_are_dropped() {
    let rig = subscribed(BTC, &[(Timeframe::M1, 0)]).await;
    rig.clock.set_ms(T0 + 10 * MIN);

    let mut foreign = ohlcv(BTC, 60, 60, vec![bar(T0, 1.0)]);
    if let Inbound::Ohlcv(m) = &mut foreign {
        m.exchange = "elsewhere".into();
    }
    rig.provider.handle_message(&foreign).await.unwrap();
    rig.provider
        .handle_message(&ohlcv(ETH, 60, 60, vec![bar(T0, 1.0)]))
        .await
        .unwrap();

    assert!(rig.sink.is_empty());
}

#[tokio::test]
async fn prices_reach_the_sink() {
    let rig = subscribed(BTC, &[(Timeframe::M1, 0)]).await;
    let prices = HashMap::from([(BTC.to_string(), 42_000.5)]);
    let msg = Inbound::Price(PriceMessage {
        exchange: "mock".into(),
        market: "spot".into(),
        prices: prices.clone(),
    });
    rig.provider.handle_message(&msg).await.unwrap();
    assert_eq!(rig.sink.prices(), vec![prices]);
}

#[tokio::test]
async fn malformed_frames_are_decode_errors() {
    let rig = subscribed(BTC, &[(Timeframe::M1, 0)]).await;
    let err = rig.provider.handle_frame(b"{not json").await.unwrap_err();
    assert!(matches!(err, FeedError::Decode(_)));

    let unsorted = ohlcv(BTC, 60, 60, vec![bar(T0 + MIN, 1.0), bar(T0, 1.0)]);
    let frame = serde_json::to_vec(&unsorted).unwrap();
    let err = rig.provider.handle_frame(&frame).await.unwrap_err();
    assert!(matches!(err, FeedError::Decode(_)));
}

#[tokio::test]
async fn bars_closing_past_the_time_range_are_decode_errors() {
    let rig = subscribed(BTC, &[(Timeframe::M1, 0)]).await;
    rig.clock.set_ms(T0 + 10 * MIN);

    let err = rig
        .provider
        .handle_message(&ohlcv(BTC, 60, 5, vec![bar(i64::MAX - 1_000, 1.0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Decode(_)), "{err}");
    assert!(rig.sink.bars_of(&sym(BTC), Timeframe::M1).is_empty());

    rig.provider
        .handle_message(&ohlcv(BTC, 60, 60, vec![bar(T0, 1.0)]))
        .await
        .unwrap();
    assert_eq!(stamps(&rig.sink.bars_of(&sym(BTC), Timeframe::M1)), vec![T0]);
}
