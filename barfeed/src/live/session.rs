use std::sync::Arc;
use std::time::Duration;

use barfeed_core::{FeedError, Frame, LiveFeeder};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::LiveProvider;
use super::backoff::Backoff;

enum Ended {
    Stopped,
    Disconnected,
}

/// Receive loop of a live provider.
///
/// Frames are handed to a worker task over a bounded queue; a full queue
/// drops the frame. Returns once stopped, or when the stream ends without a
/// reconnect policy.
pub async fn run<F>(
    provider: Arc<LiveProvider<F>>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<(), FeedError>
where
    F: LiveFeeder + ?Sized + 'static,
{
    let buffer = provider.config().frame_buffer.max(1);
    let (work_tx, mut work_rx) = mpsc::channel::<Vec<u8>>(buffer);
    let worker = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            while let Some(frame) = work_rx.recv().await {
                if let Err(_e) = provider.handle_frame(&frame).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(target: "barfeed::live", error = %_e, "dropping live message");
                }
            }
        })
    };

    let mut backoff = provider.config().backoff.map(Backoff::new);
    let mut reconnecting = false;
    let res = loop {
        let connected = tokio::select! {
            biased;
            _ = &mut stop_rx => break Ok(()),
            r = provider.transport().connect(buffer) => r,
        };
        let attempt = match connected {
            Ok(rx) if reconnecting => provider.resubscribe().await.map(|()| rx),
            other => other,
        };
        match attempt {
            Ok(rx) => {
                #[cfg(feature = "tracing")]
                tracing::info!(target: "barfeed::live", address = provider.transport().address(), "live stream connected");
                if let Some(b) = backoff.as_mut() {
                    b.reset();
                }
                match pump(rx, &work_tx, &mut stop_rx).await {
                    Ok(Ended::Stopped) => break Ok(()),
                    Ok(Ended::Disconnected) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(target: "barfeed::live", "live stream closed");
                    }
                    Err(e) => break Err(e),
                }
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(target: "barfeed::live", error = %e, "live connect failed");
                if backoff.is_none() {
                    break Err(e);
                }
            }
        }
        let Some(b) = backoff.as_mut() else {
            break Ok(());
        };
        let delay = Duration::from_millis(b.next_delay_ms());
        tokio::select! {
            biased;
            _ = &mut stop_rx => break Ok(()),
            () = tokio::time::sleep(delay) => {}
        }
        reconnecting = true;
    };

    drop(work_tx);
    worker
        .await
        .map_err(|e| FeedError::Other(format!("live worker failed: {e}")))?;
    res
}

async fn pump(
    mut rx: mpsc::Receiver<Frame>,
    work_tx: &mpsc::Sender<Vec<u8>>,
    stop_rx: &mut oneshot::Receiver<()>,
) -> Result<Ended, FeedError> {
    loop {
        tokio::select! {
            biased;
            _ = &mut *stop_rx => return Ok(Ended::Stopped),
            frame = rx.recv() => match frame {
                Some(Ok(bytes)) => match work_tx.try_send(bytes) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(target: "barfeed::live", "frame queue full, dropping frame");
                    }
                    Err(TrySendError::Closed(_)) => {
                        return Err(FeedError::Other("live worker is gone".into()));
                    }
                },
                Some(Err(e)) if e.is_live_recoverable() => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(target: "barfeed::live", error = %e, "transport reported a bad frame");
                    let _ = e;
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(Ended::Disconnected),
            }
        }
    }
}
