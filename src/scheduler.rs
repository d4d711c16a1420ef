//! Bounded-concurrency execution of deferred RPC work.
//!
//! Work is split into consecutive batches; every item of a batch is started
//! before any is awaited, and the next batch only starts once the whole batch
//! has resolved. Batch size is the only backpressure, so it is what keeps a
//! scan under an endpoint's rate limit.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::rpc::RpcError;

/// Runs `items` in batches of at most `batch_size`, pausing `inter_batch_delay`
/// between batches. `result[i]` is the value produced by `items[i]`.
///
/// The first failure aborts the whole run; items of later batches are never
/// invoked. Call sites that expect some items to fail wrap them with [`tolerant`].
pub async fn run_batched<I, F, Fut, T, E>(
    items: I,
    batch_size: usize,
    label: &str,
    inter_batch_delay: Duration,
) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let items: Vec<F> = items.into_iter().collect();
    let total = items.len();

    let batch_size = if batch_size == 0 {
        tracing::warn!("{}: batch size 0 requested, running items one at a time", label);
        1
    } else {
        batch_size
    };
    let batch_count = total.div_ceil(batch_size);

    let mut results = Vec::with_capacity(total);
    let mut pending = items.into_iter();

    for batch_idx in 0..batch_count {
        if batch_idx > 0 && !inter_batch_delay.is_zero() {
            tokio::time::sleep(inter_batch_delay).await;
        }

        let offset = results.len();
        let futures: Vec<Fut> = pending.by_ref().take(batch_size).map(|item| item()).collect();
        let outcomes = futures::future::join_all(futures).await;
        let batch_len = outcomes.len();

        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => results.push(value),
                Err(e) => {
                    tracing::error!(
                        "{}: item {} of {} failed in batch {}/{}: {}",
                        label,
                        offset + i,
                        total,
                        batch_idx + 1,
                        batch_count,
                        e
                    );
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            "{}: batch {}/{} done ({} items, {}/{} total)",
            label,
            batch_idx + 1,
            batch_count,
            batch_len,
            results.len(),
            total
        );
    }

    if total > 0 {
        tracing::info!("{}: {} items in {} batches", label, total, batch_count);
    }

    Ok(results)
}

/// Treats a reverted read as absent. Only for reads of slots that are known
/// to sometimes be unpopulated. Transient failures still propagate, so a
/// flaky endpoint cannot turn a populated slot into a missing one.
pub async fn tolerant<T, Fut>(label: &str, fut: Fut) -> Result<Option<T>, RpcError>
where
    Fut: Future<Output = Result<T, RpcError>>,
{
    match fut.await {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_retryable() => Err(e),
        Err(e) => {
            tracing::debug!("{}: treating as absent: {}", label, e);
            Ok(None)
        }
    }
}
