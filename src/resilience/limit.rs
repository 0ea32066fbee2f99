//! Bounded concurrent fan-out
//!
//! The pipeline fans out at three points: per-unique-column duplicate
//! checks, per-FK-column option fetches and per-value deferred
//! creations. All three are unordered and result-order-independent, so
//! they share this helper: a semaphore caps how many tasks are in
//! flight at once so a large import cannot overwhelm downstream
//! services.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `f` over `items` with at most `limit` tasks in flight.
///
/// Results are returned in input order. Per-item failures must be
/// encoded in `O` by the caller; an `Err` from this function means a
/// task panicked or was aborted, which callers treat as a systemic
/// batch failure.
pub async fn fan_out<I, O, F, Fut>(items: Vec<I>, limit: usize, f: F) -> anyhow::Result<Vec<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("fan-out semaphore closed"))?;
        let fut = f(item);
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            fut.await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await?);
    }

    Ok(results)
}
