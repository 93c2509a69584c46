use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Bounded pool of flush tasks.
///
/// At most `workers` tasks run at once; up to `max_pending` more may wait
/// for a worker. Beyond that, [`FlushPool::try_spawn`] hands the task back so
/// the caller can run it itself.
pub(crate) struct FlushPool {
    workers: Arc<Semaphore>,
    tasks: JoinSet<()>,
    capacity: usize,
}

impl FlushPool {
    pub(crate) fn new(workers: usize, max_pending: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
            capacity: workers + max_pending,
        }
    }

    pub(crate) fn try_spawn<F>(&mut self, task: F) -> Result<(), F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        if self.tasks.len() >= self.capacity {
            return Err(task);
        }

        let workers = Arc::clone(&self.workers);
        self.tasks.spawn(async move {
            let _permit = workers.acquire_owned().await;
            task.await;
        });
        Ok(())
    }

    /// Tasks spawned and not yet reaped.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every spawned task.
    pub(crate) async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "flush task failed");
            }
        }
    }

    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "flush task failed");
            }
        }
    }
}
