use std::sync::Arc;

use barfeed::{FeedBuilder, SubscribeRequest};
use barfeed_core::{BarSink, HistorySource, LogProgress, ProgressSink, SymbolResolver, Timeframe};
use barfeed_demos::common::{PrintSink, demo_store, demo_window};
use barfeed_mock::StaticResolver;
use barfeed_mock::fixtures::sym;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Suggested: RUST_LOG=info,barfeed=debug
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .try_init();

    let history: Arc<dyn HistorySource> = demo_store(&["BTC/USDT"], 120);
    let resolver: Arc<dyn SymbolResolver> = Arc::new(StaticResolver::new());
    let sink: Arc<dyn BarSink> = Arc::new(PrintSink::default());
    let progress: Arc<dyn ProgressSink> = Arc::new(LogProgress::new());

    let provider = FeedBuilder::new()
        .venue("mock", "spot")
        .time_range(demo_window(120))
        .with_resolver(resolver)
        .with_history(history)
        .with_sink(sink)
        .with_progress(progress)
        .build_hist()?;

    let counts = [(Timeframe::M1, 30)].into_iter().collect();
    let request: SubscribeRequest = [(sym("BTC/USDT"), counts)].into_iter().collect();
    provider.subscribe(&request, false).await?;
    provider.loop_main().await?;
    Ok(())
}
