//! Deterministic bar generators.

use barfeed_core::{Bar, Instrument, Symbol, Timeframe};

/// Symbol from a fixture literal.
///
/// # Panics
/// If `s` is not a valid symbol.
#[must_use]
pub fn sym(s: &str) -> Symbol {
    Symbol::new(s).expect("fixture symbol must be valid")
}

/// Instrument on the `mock`/`spot` venue.
#[must_use]
pub fn instrument(s: &str, id: i64) -> Instrument {
    Instrument {
        id,
        symbol: sym(s),
        exchange: "mock".to_string(),
        market: "spot".to_string(),
    }
}

/// Flat bar at `close`.
#[must_use]
pub const fn bar(ts: i64, close: f64) -> Bar {
    Bar {
        ts,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
    }
}

/// `n` consecutive bars of `tf` from `start_ms` with a slow upward drift.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn series(start_ms: i64, tf: Timeframe, n: usize, base: f64) -> Vec<Bar> {
    let mut prev = base;
    (0..n)
        .map(|i| {
            let close = base + (i % 17) as f64 * 0.5 - (i % 5) as f64 * 0.25;
            let b = Bar {
                ts: start_ms + i as i64 * tf.ms(),
                open: prev,
                high: prev.max(close) + 1.0,
                low: prev.min(close) - 1.0,
                close,
                volume: 10.0 + (i % 7) as f64,
            };
            prev = close;
            b
        })
        .collect()
}
