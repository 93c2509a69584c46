//! Scatter/gather queries across every shard.

use linkvault_core::Shard;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::warn;

use crate::{Result, StorageError};

fn spawn_all<T, F, Fut>(query: F) -> JoinSet<(Shard, Result<T>)>
where
    T: Send + 'static,
    F: Fn(Shard) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for shard in Shard::all() {
        let fut = query(shard);
        tasks.spawn(async move { (shard, fut.await) });
    }
    tasks
}

/// Runs `query` on every shard and returns the first hit, aborting the rest.
///
/// A shard that fails is logged and counts as a miss. `Ok(None)` means no
/// shard produced a hit before `deadline`.
pub(crate) async fn race<T, F, Fut>(deadline: Duration, query: F) -> Result<Option<T>>
where
    T: Send + 'static,
    F: Fn(Shard) -> Fut,
    Fut: Future<Output = Result<Option<T>>> + Send + 'static,
{
    let mut tasks = spawn_all(query);

    let outcome = tokio::time::timeout(deadline, async {
        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Some(hit)))) => return Some(hit),
                Ok((_, Ok(None))) => {}
                Ok((shard, Err(e))) => {
                    warn!(shard = %shard, error = %e, "shard query failed");
                    failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "shard task failed");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            warn!(failed, "no hit, some shards failed");
        }
        None
    })
    .await;

    tasks.abort_all();
    match outcome {
        Ok(hit) => Ok(hit),
        Err(_) => {
            warn!(deadline = ?deadline, "fan-out query hit its deadline without a match");
            Ok(None)
        }
    }
}

/// Runs `query` on every shard and concatenates the results.
///
/// Any shard failure fails the whole call and aborts the remaining queries.
pub(crate) async fn gather<T, F, Fut>(deadline: Duration, query: F) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Shard) -> Fut,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    let mut tasks = spawn_all(query);

    let outcome = tokio::time::timeout(deadline, async {
        let mut merged = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(items))) => merged.extend(items),
                Ok((shard, Err(e))) => {
                    warn!(shard = %shard, error = %e, "shard query failed");
                    return Err(e);
                }
                Err(e) => {
                    return Err(StorageError::Operation(format!("shard task failed: {e}")));
                }
            }
        }
        Ok(merged)
    })
    .await;

    tasks.abort_all();
    outcome.unwrap_or_else(|_| {
        Err(StorageError::Timeout(format!(
            "fan-out query exceeded {deadline:?}"
        )))
    })
}
