use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Coalesces concurrent calls with the same key into one execution.
///
/// The first caller runs its work; callers arriving while it is in flight
/// wait and receive a clone of the same output. If the running caller is
/// cancelled, one of the waiters runs its own work instead. The key is
/// forgotten as soon as the call completes, so later calls execute again.
pub struct SingleFlight<K, T> {
    calls: DashMap<K, Arc<OnceCell<T>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }

    pub async fn run<F, Fut>(&self, key: K, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let call = Arc::clone(self.calls.entry(key.clone()).or_default().value());
        let output = call.get_or_init(work).await.clone();
        self.calls
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &call));
        output
    }

    /// Keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::task::JoinSet;

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_execution() {
        let flights = Arc::new(SingleFlight::<String, u32>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut callers = JoinSet::new();
        for _ in 0..16 {
            let flights = flights.clone();
            let executions = executions.clone();
            callers.spawn(async move {
                flights
                    .run("a1B2c3D".to_string(), || async {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        42
                    })
                    .await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = callers.join_next().await {
            results.push(joined.unwrap());
        }

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(results, vec![42; 16]);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_receive_the_same_error() {
        let flights = Arc::new(SingleFlight::<&'static str, Result<u32, String>>::new());

        let mut callers = JoinSet::new();
        for _ in 0..4 {
            let flights = flights.clone();
            callers.spawn(async move {
                flights
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err("backend down".to_string())
                    })
                    .await
            });
        }

        while let Some(joined) = callers.join_next().await {
            assert_eq!(joined.unwrap(), Err("backend down".to_string()));
        }
    }

    #[tokio::test]
    async fn completed_calls_are_not_cached() {
        let flights = SingleFlight::<u8, usize>::new();
        let executions = AtomicUsize::new(0);

        for expected in 1..=3 {
            let seen = flights
                .run(7, || async { executions.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(seen, expected);
        }
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_takes_over_when_runner_is_cancelled() {
        let flights = Arc::new(SingleFlight::<u8, &'static str>::new());

        let runner = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .run(1, || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        "runner"
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let waiter = {
            let flights = flights.clone();
            tokio::spawn(async move { flights.run(1, || async { "waiter" }).await })
        };
        tokio::task::yield_now().await;
        runner.abort();

        assert_eq!(waiter.await.unwrap(), "waiter");
    }
}
