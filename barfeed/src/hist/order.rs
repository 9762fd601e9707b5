//! Merge order of the replay loop.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use barfeed_core::{Feeder, SharedFeeder, Symbol};

/// Position of a feeder in the merge: next-due timestamp, then symbol.
///
/// Exhausted feeders carry [`EXHAUSTED_MS`](barfeed_core::EXHAUSTED_MS) and
/// therefore sort after every feeder that still has data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeederKey {
    /// Next-due timestamp in milliseconds.
    pub next_ms: i64,
    /// Tie-break.
    pub symbol: Symbol,
}

/// Feeder with its cached merge key.
///
/// The key is read under the feeder lock when the entry is built or
/// refreshed, so comparisons never lock.
pub struct Entry<F: ?Sized> {
    /// Cached key.
    pub key: FeederKey,
    /// The feeder.
    pub feeder: SharedFeeder<F>,
}

impl<F: Feeder + ?Sized> Entry<F> {
    /// Read the key of `feeder`.
    pub async fn load(feeder: SharedFeeder<F>) -> Self {
        let key = {
            let guard = feeder.lock().await;
            FeederKey {
                next_ms: guard.next_due_ms(),
                symbol: guard.symbol().clone(),
            }
        };
        Self { key, feeder }
    }
}

impl<F: ?Sized> Clone for Entry<F> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            feeder: Arc::clone(&self.feeder),
        }
    }
}

impl<F: ?Sized> PartialEq for Entry<F> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<F: ?Sized> Eq for Entry<F> {}

impl<F: ?Sized> PartialOrd for Entry<F> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<F: ?Sized> Ord for Entry<F> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Full sort, used when the working set is rebuilt.
pub fn sort_all<T: Ord>(list: &mut VecDeque<T>) {
    list.make_contiguous().sort();
}

/// Insert `item` into an already sorted `list` after every element not greater than it.
///
/// Equivalent to pushing and fully re-sorting, in O(log n) comparisons.
pub fn insert_sorted<T: Ord>(list: &mut VecDeque<T>, item: T) {
    let at = list.partition_point(|e| *e <= item);
    list.insert(at, item);
}
