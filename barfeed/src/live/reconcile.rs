//! Bar-completion heuristic for live pushes.

use barfeed_core::{Bar, CompletionConfig};

/// Outcome of reconciling one pushed message with a feeder's pending bar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciled {
    /// Bars certified final, ascending by timestamp.
    pub complete: Vec<Bar>,
    /// The feeder's new pending bar.
    pub pending: Option<Bar>,
}

/// Inputs describing one pushed message.
#[derive(Debug, Clone, Copy)]
pub struct Push<'a> {
    /// Pushed bars, ascending.
    pub bars: &'a [Bar],
    /// Length of each pushed bar in seconds.
    pub tf_secs: i64,
    /// Server push interval in seconds.
    pub interval_secs: i64,
}

/// Decide which pushed bars are final.
///
/// When the push interval covers a whole bar, every bar is final. Otherwise
/// all but the last bar are final, joined by a pending bar older than the
/// last one. The last bar is then held back on a fast stream of a long
/// timeframe when nothing else completed, delivered when its close is within
/// the slack of the push interval, and held back otherwise.
///
/// `feeder_tf_secs` is the smallest timeframe the feeder produces; `now_ms`
/// the current wall time. A pending bar and a pushed bar with the same
/// timestamp collapse to the pushed one.
#[must_use]
pub fn reconcile(
    push: Push<'_>,
    feeder_tf_secs: i64,
    pending: Option<Bar>,
    now_ms: i64,
    cfg: &CompletionConfig,
) -> Reconciled {
    let Some((last, rest)) = push.bars.split_last() else {
        return Reconciled {
            complete: Vec::new(),
            pending,
        };
    };
    if push.interval_secs >= push.tf_secs {
        return Reconciled {
            complete: push.bars.to_vec(),
            pending,
        };
    }

    let mut complete = rest.to_vec();
    let mut pending = pending;
    if let Some(p) = pending
        && p.ts < last.ts
    {
        complete.push(p);
        complete.sort_by_key(|b| b.ts);
        complete.dedup_by_key(|b| b.ts);
        pending = None;
    }

    if complete.is_empty()
        && push.interval_secs <= cfg.fast_push_secs
        && feeder_tf_secs >= cfg.min_timeframe_secs
    {
        return Reconciled {
            complete,
            pending: Some(*last),
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let remaining_ms = last
        .ts
        .saturating_add(push.tf_secs.saturating_mul(1000))
        .saturating_sub(now_ms) as f64;
    #[allow(clippy::cast_precision_loss)]
    let slack_ms = push.interval_secs as f64 * 1000.0 * cfg.close_slack_ratio;
    if remaining_ms <= slack_ms {
        complete.push(*last);
        if pending.is_some_and(|p| p.ts == last.ts) {
            pending = None;
        }
    } else {
        pending = Some(*last);
    }
    Reconciled { complete, pending }
}
