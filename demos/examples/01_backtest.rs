use std::sync::Arc;

use barfeed::{FeedBuilder, SubscribeRequest};
use barfeed_core::{BarSink, HistorySource, SymbolResolver, Timeframe};
use barfeed_demos::common::{PrintSink, demo_store, demo_window};
use barfeed_mock::StaticResolver;
use barfeed_mock::fixtures::sym;

const SYMBOLS: &[&str] = &["BTC/USDT", "ETH/USDT", "SOL/USDT"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let minutes = 4 * 60;
    let history: Arc<dyn HistorySource> = demo_store(SYMBOLS, minutes);
    let resolver: Arc<dyn SymbolResolver> = Arc::new(StaticResolver::new());
    let sink = Arc::new(PrintSink::printing_from(Timeframe::H1));
    let bar_sink: Arc<dyn BarSink> = sink.clone();

    let provider = FeedBuilder::new()
        .venue("mock", "spot")
        .concurrency(4)
        .time_range(demo_window(i64::try_from(minutes)?))
        .with_resolver(resolver)
        .with_history(history)
        .with_sink(bar_sink)
        .build_hist()?;

    // One-minute bars drive the replay; 15m and 1h are built from them.
    let request: SubscribeRequest = SYMBOLS
        .iter()
        .map(|s| {
            let counts = [(Timeframe::M1, 60), (Timeframe::M15, 8), (Timeframe::H1, 4)]
                .into_iter()
                .collect();
            (sym(s), counts)
        })
        .collect();
    let out = provider.subscribe(&request, false).await?;
    println!("subscribed {} feeders", out.new_feeders.len());

    provider.loop_main().await?;
    sink.summary();
    Ok(())
}
