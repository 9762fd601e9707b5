use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::FeedError;

/// Running task that can report completion and be cancelled.
pub trait TaskControl {
    /// Whether the task already returned.
    fn is_done(&self) -> bool;
    /// Cancel the task.
    fn cancel(&mut self);
}

impl<T> TaskControl for JoinHandle<T> {
    fn is_done(&self) -> bool {
        self.is_finished()
    }

    fn cancel(&mut self) {
        self.abort();
    }
}

/// One-shot request asking a task to wind down on its own.
pub trait StopSignal {
    /// Fire the signal; a receiver that is already gone is ignored.
    fn fire(self);
}

impl StopSignal for oneshot::Sender<()> {
    fn fire(self) {
        let _ = self.send(());
    }
}

/// Release a task that is no longer owned.
///
/// The stop signal fires first so a loop between two awaits can exit
/// cleanly; a task still running afterwards is cancelled. Both slots are
/// left empty.
pub fn release<T, S>(task: &mut Option<T>, stop: &mut Option<S>)
where
    T: TaskControl,
    S: StopSignal,
{
    if let Some(signal) = stop.take() {
        signal.fire();
    }
    if let Some(mut running) = task.take().filter(|t| !t.is_done()) {
        running.cancel();
    }
}

/// Owner of a background feed task (e.g. a live provider's receive loop).
///
/// Dropping the handle requests a stop and aborts the task if it is still
/// running. Use [`stop`](Self::stop) to wait for a graceful exit instead.
#[derive(Debug)]
pub struct FeedHandle {
    inner: Option<JoinHandle<Result<(), FeedError>>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl FeedHandle {
    /// Wrap a spawned task and its stop signal.
    #[must_use]
    pub const fn new(
        inner: JoinHandle<Result<(), FeedError>>,
        stop_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            inner: Some(inner),
            stop_tx: Some(stop_tx),
        }
    }

    /// Returns true once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the task to stop and wait for its result.
    ///
    /// # Errors
    /// Returns the task's own error, or `Other` if the task panicked.
    pub async fn stop(mut self) -> Result<(), FeedError> {
        if let Some(tx) = self.stop_tx.take() {
            tx.fire();
        }
        self.join_inner().await
    }

    /// Wait for the task to exit on its own.
    ///
    /// # Errors
    /// Returns the task's own error, or `Other` if the task panicked.
    pub async fn join(mut self) -> Result<(), FeedError> {
        self.join_inner().await
    }

    async fn join_inner(&mut self) -> Result<(), FeedError> {
        match self.inner.take() {
            Some(h) => h
                .await
                .map_err(|e| FeedError::Other(format!("feed task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        release(&mut self.inner, &mut self.stop_tx);
    }
}
