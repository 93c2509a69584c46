use linkvault_cache::{ExistenceFilter, UrlCache};
use linkvault_storage::LinkStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;

use crate::service::{LinkService, MaintenanceReport};
use crate::{LookupError, Result};

#[derive(Debug, Clone, TypedBuilder)]
pub struct JobConfig {
    /// Time between the starts of two passes.
    #[builder(default = Duration::from_secs(3600))]
    pub interval: Duration,
    /// Upper bound of one pass.
    #[builder(default = Duration::from_secs(300))]
    pub timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Periodic expiry sweep and filter rebuild.
pub struct MaintenanceJob<C, F, S> {
    service: Arc<LinkService<C, F, S>>,
    config: JobConfig,
}

impl<C, F, S> MaintenanceJob<C, F, S>
where
    C: UrlCache,
    F: ExistenceFilter,
    S: LinkStore,
{
    pub fn new(service: Arc<LinkService<C, F, S>>, config: JobConfig) -> Self {
        Self { service, config }
    }

    /// Runs one pass bounded by the job timeout.
    ///
    /// The pass runs as its own task. Past the timeout this returns
    /// [`LookupError::Timeout`] and the pass finishes detached, so records
    /// already swept are still evicted from the caches.
    pub async fn run_once(&self) -> Result<MaintenanceReport> {
        let service = Arc::clone(&self.service);
        let mut pass = tokio::spawn(async move { service.run_maintenance().await });

        match tokio::time::timeout(self.config.timeout, &mut pass).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => Err(LookupError::Task(format!("maintenance pass: {e}"))),
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "maintenance pass overran, detaching");
                tokio::spawn(async move {
                    match pass.await {
                        Ok(Ok(report)) => info!(
                            expired = report.expired.len(),
                            indexed = report.indexed,
                            "detached maintenance pass finished"
                        ),
                        Ok(Err(e)) => error!(error = %e, "detached maintenance pass failed"),
                        Err(e) => error!(error = %e, "detached maintenance task failed"),
                    }
                });
                Err(LookupError::Timeout(format!(
                    "maintenance pass exceeded {:?}",
                    self.config.timeout
                )))
            }
        }
    }

    /// Runs a pass every interval until `shutdown` resolves. Returns the number
    /// of passes that succeeded.
    pub async fn run_until<Fut>(&self, shutdown: Fut) -> usize
    where
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut succeeded = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            match self.run_once().await {
                Ok(report) => {
                    succeeded += 1;
                    info!(
                        expired = report.expired.len(),
                        indexed = report.indexed,
                        "maintenance pass finished"
                    );
                }
                Err(e) => error!(error = %e, "maintenance pass failed"),
            }
        }

        info!(passes = succeeded, "maintenance job stopped");
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{expired_record, live_record, stack};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn run_once_reports_pass() {
        let service = Arc::new(stack());
        let stale = expired_record("a000001", "https://stale.example");
        service
            .store()
            .seed(&[stale.clone(), live_record("a000002", "https://live.example")])
            .await;
        let job = MaintenanceJob::new(service.clone(), JobConfig::default());

        let report = job.run_once().await.unwrap();

        assert_eq!(report.expired, vec![stale.code]);
        assert_eq!(report.indexed, 1);
    }

    #[tokio::test]
    async fn run_once_times_out() {
        let service = Arc::new(stack());
        service.store().sweep_delay_ms.store(30_000, Ordering::SeqCst);
        let job = MaintenanceJob::new(
            service,
            JobConfig::builder()
                .timeout(Duration::from_millis(20))
                .build(),
        );

        let err = job.run_once().await.unwrap_err();

        assert!(matches!(err, LookupError::Timeout(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overrun_pass_still_purges_swept_codes() {
        let service = Arc::new(stack());
        let stale = expired_record("s000001", "https://stale.example");
        service.store().seed(&[stale.clone()]).await;
        service.local().insert(&stale.code, stale.origin.clone());
        service
            .remote()
            .set_url(&stale.code, &stale.origin)
            .await
            .unwrap();
        service.store().sweep_delay_ms.store(100, Ordering::SeqCst);
        let job = MaintenanceJob::new(
            service.clone(),
            JobConfig::builder()
                .timeout(Duration::from_millis(20))
                .build(),
        );

        let err = job.run_once().await.unwrap_err();
        assert!(matches!(err, LookupError::Timeout(_)));

        awaitility::at_most(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(5))
            .until_async(|| async {
                service.local().get(&stale.code).is_none()
                    && service.remote().get_url(&stale.code).await.unwrap().is_none()
            })
            .await;
        assert!(service
            .store()
            .find_expired(jiff::Timestamp::now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn run_until_stops_on_shutdown() {
        let service = Arc::new(stack());
        let job = MaintenanceJob::new(
            service,
            JobConfig::builder()
                .interval(Duration::from_millis(10))
                .build(),
        );

        let passes = job
            .run_until(tokio::time::sleep(Duration::from_millis(60)))
            .await;

        assert!(passes >= 1);
    }
}
