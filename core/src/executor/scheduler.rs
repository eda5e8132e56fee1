use std::future::Future;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

/// Run `f` over every item with at most `max_concurrency` futures in flight.
///
/// Every item is driven to completion; results come back in completion order.
pub async fn execute_bounded<I, T, F, Fut, R>(items: I, max_concurrency: usize, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    execute_with_permits(items, permits, f).await
}

/// Same as [`execute_bounded`], drawing permits from a shared semaphore so the
/// bound can span several callers.
pub async fn execute_with_permits<I, T, F, Fut, R>(
    items: I,
    permits: Arc<Semaphore>,
    f: F,
) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut futs: FuturesUnordered<_> = FuturesUnordered::new();

    for item in items {
        let permits = permits.clone();
        let fut = f(item);

        futs.push(async move {
            // A closed semaphore only happens on shutdown; run unbounded then.
            let _permit = permits.acquire_owned().await;
            fut.await
        });
    }

    let mut results = Vec::with_capacity(futs.len());
    while let Some(res) = futs.next().await {
        results.push(res);
    }

    results
}
