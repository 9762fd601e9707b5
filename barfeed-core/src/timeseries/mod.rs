/// Aggregation of bars into larger timeframes.
pub mod resample;
/// Timestamp alignment helpers.
pub mod util;
