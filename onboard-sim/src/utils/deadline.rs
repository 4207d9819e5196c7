//! Deadline and cancellation wrapper for external calls
//!
//! Every collaborator call made on behalf of a session runs under an explicit
//! deadline and the session's cancellation token.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadlineError {
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Cancelled")]
    Cancelled,
}

/// Run `future` until it completes, the deadline passes or `cancel` fires
pub async fn with_deadline<F, T>(
    deadline: Duration,
    cancel: &CancellationToken,
    future: F,
) -> Result<T, DeadlineError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeadlineError::Cancelled),
        result = tokio::time::timeout(deadline, future) => {
            result.map_err(|_| DeadlineError::TimedOut(deadline))
        }
    }
}
