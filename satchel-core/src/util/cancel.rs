use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, SatchelError};

/// Race `fut` against `token`; cancellation wins ties.
pub async fn or_cancel<F: Future>(token: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SatchelError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Cancellable sleep.
pub async fn pause(token: &CancellationToken, d: Duration) -> Result<()> {
    or_cancel(token, tokio::time::sleep(d)).await
}
