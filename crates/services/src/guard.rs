use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Runs a call against a derived store (ranking index or snapshot cache).
///
/// Returns `None` on error or timeout after logging it; callers pick the
/// fallback.
pub(crate) async fn guarded<T, F>(
    store: &'static str,
    op: &'static str,
    limit: Duration,
    call: F,
) -> Option<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(store, op, error = %err, "store call failed");
            None
        }
        Err(_) => {
            warn!(store, op, timeout_ms = limit.as_millis() as u64, "store call timed out");
            None
        }
    }
}
