//! Control channel between a provider and its replay loop.

use std::sync::atomic::{AtomicU64, Ordering};

use barfeed_core::FeedError;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Message consumed by the replay loop between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// The feeder set changed; rebuild the merge order if this generation is newer.
    Rebuild(u64),
    /// Terminate the loop after the current batch.
    Stop,
}

/// Sending half of the control channel, owning the generation counter.
#[derive(Debug)]
pub struct ControlSender {
    tx: mpsc::Sender<Control>,
    generation: AtomicU64,
}

/// Create a control channel with room for `capacity` pending messages.
#[must_use]
pub fn channel(capacity: usize) -> (ControlSender, mpsc::Receiver<Control>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ControlSender {
            tx,
            generation: AtomicU64::new(0),
        },
        rx,
    )
}

impl ControlSender {
    /// Last generation handed out.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Bump the generation and announce it.
    ///
    /// # Errors
    /// `ControlChannel` when the buffer is full: the loop is not draining
    /// signals, which is a bug in the caller rather than a condition to wait out.
    pub fn rebuild(&self) -> Result<u64, FeedError> {
        let next = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.send(Control::Rebuild(next))?;
        Ok(next)
    }

    /// Ask the loop to terminate.
    ///
    /// # Errors
    /// `ControlChannel` when the buffer is full or the loop side is gone.
    pub fn stop(&self) -> Result<(), FeedError> {
        self.send(Control::Stop)
    }

    fn send(&self, msg: Control) -> Result<(), FeedError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(m) => {
                FeedError::ControlChannel(format!("buffer full, dropped {m:?}"))
            }
            TrySendError::Closed(m) => {
                FeedError::ControlChannel(format!("receiver closed, dropped {m:?}"))
            }
        })
    }
}
