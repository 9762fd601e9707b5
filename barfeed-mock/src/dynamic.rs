use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use barfeed_core::{FeedError, Frame, Inbound, LiveTransport, Symbol, WatchJob, WatchKind};
use tokio::sync::{Mutex, mpsc};

/// One `watch_jobs` or `unwatch_jobs` call as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCall {
    /// Jobs registered.
    Watch {
        /// Data kind.
        kind: WatchKind,
        /// Jobs in request order.
        jobs: Vec<WatchJob>,
    },
    /// Symbols released.
    Unwatch {
        /// Data kind.
        kind: WatchKind,
        /// Symbols in request order.
        symbols: Vec<Symbol>,
    },
}

#[derive(Default)]
struct InternalState {
    topics: Vec<String>,
    calls: Vec<WatchCall>,
    connects: usize,
    fail_connects: usize,
    fail_watch: Option<FeedError>,
    inbound: Option<mpsc::Sender<Frame>>,
}

/// Controller handle used by tests to drive a [`DynamicTransport`].
#[derive(Clone)]
pub struct TransportController {
    state: Arc<Mutex<InternalState>>,
}

impl TransportController {
    async fn sender(&self) -> Option<mpsc::Sender<Frame>> {
        self.state.lock().await.inbound.clone()
    }

    /// Push a raw frame into the open connection.
    ///
    /// Returns `false` if no connection is open.
    pub async fn push_frame(&self, frame: Vec<u8>) -> bool {
        match self.sender().await {
            Some(tx) => tx.send(Ok(frame)).await.is_ok(),
            None => false,
        }
    }

    /// Encode and push `msg`.
    ///
    /// # Panics
    /// If `msg` cannot be encoded.
    pub async fn push_message(&self, msg: &Inbound) -> bool {
        self.push_frame(msg.encode().expect("message must encode"))
            .await
    }

    /// Report a receive-side error on the open connection.
    pub async fn push_error(&self, err: FeedError) -> bool {
        match self.sender().await {
            Some(tx) => tx.send(Err(err)).await.is_ok(),
            None => false,
        }
    }

    /// Close the open connection.
    pub async fn disconnect(&self) {
        self.state.lock().await.inbound = None;
    }

    /// Fail the next `n` connection attempts.
    pub async fn fail_next_connects(&self, n: usize) {
        self.state.lock().await.fail_connects = n;
    }

    /// Fail every subsequent watch call with `err`; `None` clears it.
    pub async fn fail_watch(&self, err: Option<FeedError>) {
        self.state.lock().await.fail_watch = err;
    }

    /// Connection attempts so far, failed ones included.
    pub async fn connects(&self) -> usize {
        self.state.lock().await.connects
    }

    /// Whether a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .inbound
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Topics currently subscribed.
    pub async fn topics(&self) -> Vec<String> {
        self.state.lock().await.topics.clone()
    }

    /// Forget subscribed topics, as a restarted server would.
    pub async fn clear_topics(&self) {
        self.state.lock().await.topics.clear();
    }

    /// Watch and unwatch calls in order.
    pub async fn calls(&self) -> Vec<WatchCall> {
        self.state.lock().await.calls.clone()
    }

    /// Jobs of every `watch_jobs` call of `kind`, flattened.
    pub async fn watched(&self, kind: WatchKind) -> Vec<WatchJob> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                WatchCall::Watch { kind: k, jobs } if k == kind => Some(jobs),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Symbols of every `unwatch_jobs` call of `kind`, flattened.
    pub async fn unwatched(&self, kind: WatchKind) -> Vec<Symbol> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                WatchCall::Unwatch { kind: k, symbols } if k == kind => Some(symbols),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Poll until a connection is open, giving up after `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_connected().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

/// A live transport that defers all behavior to a [`TransportController`].
pub struct DynamicTransport {
    address: String,
    state: Arc<Mutex<InternalState>>,
}

impl DynamicTransport {
    /// Create a transport and its controller.
    #[must_use]
    pub fn new_with_controller(address: &str) -> (Arc<dyn LiveTransport>, TransportController) {
        let state = Arc::new(Mutex::new(InternalState::default()));
        let controller = TransportController {
            state: Arc::clone(&state),
        };
        let me = Arc::new(Self {
            address: address.to_string(),
            state,
        });
        (me as Arc<dyn LiveTransport>, controller)
    }
}

#[async_trait]
impl LiveTransport for DynamicTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self, buffer: usize) -> Result<mpsc::Receiver<Frame>, FeedError> {
        let mut guard = self.state.lock().await;
        guard.connects += 1;
        if guard.fail_connects > 0 {
            guard.fail_connects -= 1;
            return Err(FeedError::Transport(format!(
                "connect to {} refused",
                self.address
            )));
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        guard.inbound = Some(tx);
        Ok(rx)
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), FeedError> {
        let mut guard = self.state.lock().await;
        for t in topics {
            if !guard.topics.contains(t) {
                guard.topics.push(t.clone());
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, topics: &[String]) -> Result<(), FeedError> {
        let mut guard = self.state.lock().await;
        guard.topics.retain(|t| !topics.contains(t));
        Ok(())
    }

    async fn watch_jobs(
        &self,
        _exchange: &str,
        _market: &str,
        kind: WatchKind,
        jobs: &[WatchJob],
    ) -> Result<(), FeedError> {
        let mut guard = self.state.lock().await;
        if let Some(e) = &guard.fail_watch {
            return Err(e.clone());
        }
        guard.calls.push(WatchCall::Watch {
            kind,
            jobs: jobs.to_vec(),
        });
        Ok(())
    }

    async fn unwatch_jobs(
        &self,
        _exchange: &str,
        _market: &str,
        kind: WatchKind,
        symbols: &[Symbol],
    ) -> Result<(), FeedError> {
        let mut guard = self.state.lock().await;
        guard.calls.push(WatchCall::Unwatch {
            kind,
            symbols: symbols.to_vec(),
        });
        Ok(())
    }
}
