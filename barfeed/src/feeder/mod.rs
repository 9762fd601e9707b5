//! Feeder implementations backed by a bar store and a live push stream.

mod hist;
mod live;

pub use hist::StoreFeeder;
pub use live::LiveBarFeeder;

use std::collections::BTreeMap;

use barfeed_core::{
    BarSink, BarStore, FeedError, Instrument, ProgressPhase, ProgressSink, TfStates, Timeframe,
};

/// Load the warm-up bars of each timeframe in `counts` into `sink`.
///
/// Only bars closed by `as_of_ms` are loaded. Each warmed timeframe's cursor
/// moves to its first bucket at or after `as_of_ms`; one progress unit is
/// reported per timeframe.
pub(crate) async fn warm_from_store(
    store: Option<&dyn BarStore>,
    instrument: &Instrument,
    states: &mut TfStates,
    sink: &dyn BarSink,
    as_of_ms: i64,
    counts: &BTreeMap<Timeframe, usize>,
    progress: &dyn ProgressSink,
) -> Result<(), FeedError> {
    for (&tf, &count) in counts {
        if count > 0
            && let Some(store) = store
        {
            let bars = store
                .bars_before(instrument, tf, tf.align(as_of_ms), count)
                .await?;
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "barfeed::warmup",
                symbol = %instrument.symbol,
                timeframe = %tf,
                wanted = count,
                loaded = bars.len(),
                "warm bars loaded"
            );
            sink.on_warm_bars(&instrument.symbol, tf, &bars).await?;
        }
        if let Some(st) = states.get_mut(tf) {
            st.next_ms = tf.align_up(as_of_ms);
        }
        progress.advance(ProgressPhase::Warmup, 1);
    }
    Ok(())
}

/// Smallest timeframe of `states`, or a `Data` error naming `instrument`.
pub(crate) fn min_timeframe(states: &TfStates, instrument: &Instrument) -> Result<Timeframe, FeedError> {
    states
        .min_timeframe()
        .ok_or_else(|| FeedError::Data(format!("{} has no timeframes", instrument.symbol)))
}
