//! Bounded, order-preserving fan-out
//!
//! Runs one async task per keyed item with at most `workers` in flight,
//! then reassembles the results in input order. Completion order never
//! leaks into the output, so concurrent runs are as deterministic as
//! sequential ones.

use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::debug;

/// Run `task` over `items` with bounded concurrency.
///
/// Output has the same length and key order as `items`.
pub async fn dispatch_keyed<T, R, F, Fut>(
    items: Vec<(String, T)>,
    workers: usize,
    task: F,
) -> Vec<(String, R)>
where
    F: Fn(String, T) -> Fut,
    Fut: Future<Output = R>,
{
    let workers = workers.max(1);
    debug!("Dispatching {} items across {} workers", items.len(), workers);

    let mut indexed: Vec<(usize, String, R)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, (key, item))| {
            let fut = task(key.clone(), item);
            async move { (index, key, fut.await) }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    indexed.sort_by_key(|(index, _, _)| *index);
    indexed.into_iter().map(|(_, key, result)| (key, result)).collect()
}
