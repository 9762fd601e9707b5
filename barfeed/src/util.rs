use std::future::Future;

use barfeed_core::FeedError;
use tokio::task::JoinSet;

/// Run `run` over `items` with at most `limit` tasks in flight.
///
/// After the first error no new items are started; tasks already running
/// are awaited, then the first error is returned.
pub async fn parallel_run<T, F, Fut>(items: Vec<T>, limit: usize, run: F) -> Result<(), FeedError>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), FeedError>> + Send + 'static,
{
    let limit = limit.max(1);
    let mut pending = items.into_iter();
    let mut set = JoinSet::new();
    let mut first_err: Option<FeedError> = None;
    loop {
        while first_err.is_none() && set.len() < limit {
            let Some(item) = pending.next() else { break };
            set.spawn(run(item));
        }
        match set.join_next().await {
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => {
                first_err.get_or_insert(e);
            }
            Some(Err(join_err)) => {
                first_err.get_or_insert(FeedError::Other(format!("worker task failed: {join_err}")));
            }
            None => break,
        }
    }
    first_err.map_or(Ok(()), Err)
}
