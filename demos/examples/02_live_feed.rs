use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use barfeed::{FeedBuilder, SubscribeRequest};
use barfeed_core::{
    BackoffConfig, BarSink, Clock, HistorySource, Inbound, LiveMessage, PriceMessage,
    ReplayClock, SymbolResolver, Timeframe,
};
use barfeed_demos::common::{PrintSink, START_MS, demo_store};
use barfeed_mock::fixtures::{series, sym};
use barfeed_mock::{DynamicTransport, StaticResolver};

fn push(bars: Vec<barfeed_core::Bar>) -> Inbound {
    Inbound::Ohlcv(LiveMessage {
        exchange: "mock".into(),
        market: "spot".into(),
        instrument: "BTC/USDT".into(),
        timeframe_seconds: 60,
        push_interval_seconds: 5,
        bars,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, ctrl) = DynamicTransport::new_with_controller("mem://live");
    let history: Arc<dyn HistorySource> = demo_store(&["BTC/USDT"], 0);
    let resolver: Arc<dyn SymbolResolver> = Arc::new(StaticResolver::new());
    let sink = Arc::new(PrintSink::printing_from(Timeframe::M1));
    let bar_sink: Arc<dyn BarSink> = sink.clone();
    // A scripted clock stands in for wall time so the demo is repeatable.
    let clock = Arc::new(ReplayClock::new(START_MS + 15_000));
    let as_clock: Arc<dyn Clock> = clock.clone();

    let provider = FeedBuilder::new()
        .venue("mock", "spot")
        .backoff(BackoffConfig {
            min_backoff_ms: 50,
            max_backoff_ms: 500,
            factor: 2,
            jitter_percent: 10,
        })
        .with_resolver(resolver)
        .with_history(history)
        .with_transport(transport)
        .with_sink(bar_sink)
        .with_clock(as_clock)
        .build_live()
        .await?;

    let counts = [(Timeframe::M1, 10), (Timeframe::M5, 2)].into_iter().collect();
    let request: SubscribeRequest = [(sym("BTC/USDT"), counts)].into_iter().collect();
    provider.subscribe(&request, false).await?;
    let handle = provider.run();
    ctrl.wait_connected(Duration::from_secs(2)).await;

    let bars = series(START_MS, Timeframe::M1, 8, 42_000.0);
    for i in 1..bars.len() {
        // Each push carries the previous bar and the one in progress.
        clock.set_ms(bars[i].ts + 58_000);
        ctrl.push_message(&push(bars[i.saturating_sub(1)..=i].to_vec())).await;
    }
    let prices = HashMap::from([("BTC/USDT".to_string(), 42_010.0)]);
    ctrl.push_message(&Inbound::Price(PriceMessage {
        exchange: "mock".into(),
        market: "spot".into(),
        prices,
    }))
    .await;

    // Drop the connection once; the session reconnects and re-watches.
    ctrl.disconnect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("connects: {}", ctrl.connects().await);

    handle.stop().await?;
    sink.summary();
    Ok(())
}
