use std::collections::HashMap;
use std::sync::Mutex;

use barfeed_core::{ProgressPhase, ProgressSink};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: u64,
    done: u64,
    finished: bool,
}

/// Progress sink summing units per phase.
#[derive(Debug, Default)]
pub struct CountingProgress {
    phases: Mutex<HashMap<ProgressPhase, Tally>>,
}

impl CountingProgress {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, phase: ProgressPhase) -> Tally {
        self.phases
            .lock()
            .expect("mutex poisoned")
            .get(&phase)
            .copied()
            .unwrap_or_default()
    }

    /// Total announced by the last `start` of `phase`.
    #[must_use]
    pub fn total(&self, phase: ProgressPhase) -> u64 {
        self.get(phase).total
    }

    /// Units reported for `phase`.
    #[must_use]
    pub fn done(&self, phase: ProgressPhase) -> u64 {
        self.get(phase).done
    }

    /// Whether `phase` was finished.
    #[must_use]
    pub fn finished(&self, phase: ProgressPhase) -> bool {
        self.get(phase).finished
    }
}

impl ProgressSink for CountingProgress {
    fn start(&self, phase: ProgressPhase, total: u64) {
        self.phases.lock().expect("mutex poisoned").insert(
            phase,
            Tally {
                total,
                ..Tally::default()
            },
        );
    }

    fn advance(&self, phase: ProgressPhase, units: u64) {
        let mut m = self.phases.lock().expect("mutex poisoned");
        let t = m.entry(phase).or_default();
        t.done += units;
    }

    fn finish(&self, phase: ProgressPhase) {
        let mut m = self.phases.lock().expect("mutex poisoned");
        m.entry(phase).or_default().finished = true;
    }
}
