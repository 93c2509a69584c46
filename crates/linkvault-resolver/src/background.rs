use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    failures: AtomicU64,
}

struct InFlight(Arc<Counters>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Supervised fire-and-forget tasks.
///
/// Each task runs detached from the request that spawned it, bounded by its
/// own timeout. Failures and timeouts are logged and counted, never returned.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    counters: Arc<Counters>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F, E>(&self, task: &'static str, timeout: Duration, work: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.counters));

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, work).await {
                Ok(Ok(())) => trace!(task, "background task finished"),
                Ok(Err(e)) => {
                    guard.0.failures.fetch_add(1, Ordering::SeqCst);
                    error!(task, error = %e, "background task failed");
                }
                Err(_) => {
                    guard.0.failures.fetch_add(1, Ordering::SeqCst);
                    error!(task, ?timeout, "background task timed out");
                }
            }
            drop(guard);
        });
    }

    /// Tasks spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Tasks that failed or timed out since creation.
    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::SeqCst)
    }
}
