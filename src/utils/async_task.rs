use std::future::Future;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::RemoteError;
use crate::Result;

/// Runs `task` until it succeeds, bounding each attempt by the policy timeout
/// and sleeping with exponential backoff between attempts.
///
/// Returns the last error once `max_retries` attempts have failed.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    mut task: F,
    policy: &BackoffPolicy,
) -> std::result::Result<P, RemoteError>
where
    F: FnMut() -> T,
    T: Future<Output = std::result::Result<P, RemoteError>>,
{
    let op_timeout = policy.timeout();
    let mut last_error = RemoteError::Timeout(op_timeout);

    for attempt in 0..policy.max_retries {
        match timeout(op_timeout, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => {
                warn!(attempt, "task failed with error: {:?}", e);
                last_error = e;
            }
            Err(_) => {
                warn!(attempt, timeout_ms = policy.timeout_ms, "task timed out");
                last_error = RemoteError::Timeout(op_timeout);
            }
        }

        if attempt + 1 < policy.max_retries {
            sleep(policy.delay_for(attempt)).await;
        }
    }

    warn!("Task failed after {} retries", policy.max_retries);
    Err(last_error)
}

/// Spawns a named task and keeps its handle; errors are logged, not raised.
pub fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: &mut Vec<JoinHandle<()>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });
    handles.push(handle);
}
