use core::fmt;
use std::collections::HashMap;
use std::sync::Mutex;

/// Unit of work being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    /// Pre-loading bars; one unit per instrument timeframe.
    Warmup,
    /// Filling storage gaps; one unit per instrument.
    Download,
    /// Replaying history; one unit per simulated second.
    Replay,
}

impl ProgressPhase {
    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Download => "download",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of long-running phases. No control flow depends on it.
pub trait ProgressSink: Send + Sync {
    /// A phase begins with `total` units of work.
    fn start(&self, phase: ProgressPhase, total: u64);
    /// `units` more units of `phase` are done.
    fn advance(&self, phase: ProgressPhase, units: u64);
    /// The phase ended, successfully or not.
    fn finish(&self, _phase: ProgressPhase) {}
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _phase: ProgressPhase, _total: u64) {}
    fn advance(&self, _phase: ProgressPhase, _units: u64) {}
}

#[derive(Debug, Default, Clone, Copy)]
struct PhaseState {
    total: u64,
    done: u64,
    last_decile: u64,
}

/// Tracks progress per phase and logs every 10% when the `tracing` feature is on.
#[derive(Debug, Default)]
pub struct LogProgress {
    phases: Mutex<HashMap<ProgressPhase, PhaseState>>,
}

impl LogProgress {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Units done so far in `phase`.
    #[must_use]
    pub fn done(&self, phase: ProgressPhase) -> u64 {
        self.phases
            .lock()
            .map(|m| m.get(&phase).map_or(0, |s| s.done))
            .unwrap_or(0)
    }
}

impl ProgressSink for LogProgress {
    fn start(&self, phase: ProgressPhase, total: u64) {
        if let Ok(mut m) = self.phases.lock() {
            m.insert(
                phase,
                PhaseState {
                    total,
                    ..PhaseState::default()
                },
            );
        }
        #[cfg(feature = "tracing")]
        tracing::info!(target: "barfeed::progress", %phase, total, "phase started");
    }

    fn advance(&self, phase: ProgressPhase, units: u64) {
        let Ok(mut m) = self.phases.lock() else {
            return;
        };
        let st = m.entry(phase).or_default();
        st.done = st.done.saturating_add(units);
        if st.total == 0 {
            return;
        }
        let decile = (st.done.min(st.total) * 10) / st.total;
        if decile > st.last_decile {
            st.last_decile = decile;
            #[cfg(feature = "tracing")]
            tracing::info!(
                target: "barfeed::progress",
                %phase,
                percent = decile * 10,
                done = st.done,
                total = st.total,
                "progress"
            );
        }
    }

    fn finish(&self, phase: ProgressPhase) {
        #[cfg(feature = "tracing")]
        tracing::info!(target: "barfeed::progress", %phase, done = self.done(phase), "phase finished");
        #[cfg(not(feature = "tracing"))]
        let _ = phase;
    }
}
