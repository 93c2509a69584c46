use jiff::{SignedDuration, Timestamp};
use linkvault_cache::{ExistenceFilter, LocalCache, UrlCache};
use linkvault_core::{validate_origin, ShortCode, UrlRecord};
use linkvault_storage::LinkStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

use crate::background::BackgroundTasks;
use crate::single_flight::SingleFlight;
use crate::{LookupError, Result};

/// Lifetimes and background deadlines of [`LinkService`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// How long an inserted record stays resolvable.
    #[builder(default = SignedDuration::from_hours(24 * 365))]
    pub record_lifetime: SignedDuration,
    #[builder(default = Duration::from_secs(1))]
    pub remote_refresh_timeout: Duration,
    #[builder(default = Duration::from_secs(3))]
    pub remote_backfill_timeout: Duration,
    #[builder(default = Duration::from_secs(3))]
    pub filter_set_timeout: Duration,
    #[builder(default = Duration::from_secs(1))]
    pub remote_delete_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Codes removed by the expiry sweep.
    pub expired: Vec<ShortCode>,
    /// Codes loaded into the rebuilt filter.
    pub indexed: usize,
}

/// Read and write path over the cache tiers, the existence filter and the store.
///
/// Lookups try the local cache, then the remote cache, then consult the
/// filter before reaching the store. Cache and filter faults degrade to the
/// next tier; store errors are returned.
pub struct LinkService<C, F, S> {
    local: LocalCache,
    remote: Arc<C>,
    filter: Arc<F>,
    store: Arc<S>,
    flights: SingleFlight<ShortCode, Result<String>>,
    background: BackgroundTasks,
    config: ServiceConfig,
}

impl<C, F, S> LinkService<C, F, S>
where
    C: UrlCache,
    F: ExistenceFilter,
    S: LinkStore,
{
    pub fn new(local: LocalCache, remote: C, filter: F, store: S, config: ServiceConfig) -> Self {
        Self {
            local,
            remote: Arc::new(remote),
            filter: Arc::new(filter),
            store: Arc::new(store),
            flights: SingleFlight::new(),
            background: BackgroundTasks::new(),
            config,
        }
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    pub fn remote(&self) -> &C {
        &self.remote
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Resolves `code` to its origin.
    ///
    /// Concurrent lookups of the same code share one execution and its result.
    pub async fn lookup(&self, code: &ShortCode) -> Result<String> {
        self.flights
            .run(code.clone(), || self.resolve(code))
            .await
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        if let Some(origin) = self.local.get(code) {
            return Ok(origin);
        }

        match self.remote.get_url(code).await {
            Ok(Some(origin)) => {
                debug!(code = %code, "remote cache hit");
                self.local.insert(code, origin.clone());
                let remote = Arc::clone(&self.remote);
                let code = code.clone();
                self.background.spawn(
                    "remote_refresh",
                    self.config.remote_refresh_timeout,
                    async move { remote.refresh(&code).await },
                );
                return Ok(origin);
            }
            Ok(None) => trace!(code = %code, "remote cache miss"),
            Err(e) => warn!(code = %code, error = %e, "remote cache lookup failed"),
        }

        if self.filter_rules_out(code).await {
            debug!(code = %code, "filter has never seen code");
            return Err(LookupError::NotFound);
        }

        let Some(record) = self.store.find_by_code(code, Timestamp::now()).await? else {
            debug!(code = %code, "code not in store");
            return Err(LookupError::NotFound);
        };

        let remote = Arc::clone(&self.remote);
        let backfill = record.clone();
        self.background.spawn(
            "remote_backfill",
            self.config.remote_backfill_timeout,
            async move { remote.set_url(&backfill.code, &backfill.origin).await },
        );
        self.local.insert(code, record.origin.clone());
        debug!(code = %code, "resolved from store");
        Ok(record.origin)
    }

    /// `true` only when an initialized filter answers that `code` was never set.
    async fn filter_rules_out(&self, code: &ShortCode) -> bool {
        match self.filter.is_initialized().await {
            Ok(true) => {}
            Ok(false) => {
                trace!("filter not initialized, skipping");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "filter initialization check failed, skipping");
                return false;
            }
        }

        match self.filter.exist(code).await {
            Ok(exists) => !exists,
            Err(e) => {
                warn!(code = %code, error = %e, "filter check failed, falling through to store");
                false
            }
        }
    }

    /// Stores a new mapping expiring after the configured record lifetime.
    ///
    /// Returns once the store accepted the record; with a buffered store it
    /// becomes readable from the store after the next flush.
    pub async fn insert(&self, code: ShortCode, origin: &str) -> Result<UrlRecord> {
        let expire_at = Timestamp::now() + self.config.record_lifetime;
        let record = UrlRecord::new(code, origin, expire_at)?;

        self.store.insert(record.clone()).await?;
        self.local.insert(&record.code, record.origin.clone());

        let filter = Arc::clone(&self.filter);
        let code = record.code.clone();
        self.background.spawn(
            "filter_set",
            self.config.filter_set_timeout,
            async move { filter.set(&code).await },
        );

        debug!(code = %record.code, "record accepted");
        Ok(record)
    }

    /// Deletes `code` everywhere. Returns whether the store held it.
    pub async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let existed = self.store.delete(code).await?;
        self.purge(code);
        debug!(code = %code, existed, "record deleted");
        Ok(existed)
    }

    /// Finds the unexpired record stored for `origin`.
    pub async fn lookup_by_origin(&self, origin: &str) -> Result<UrlRecord> {
        validate_origin(origin)?;
        self.store
            .find_by_origin(origin, Timestamp::now())
            .await?
            .ok_or(LookupError::NotFound)
    }

    /// Deletes every expired record and evicts it from both cache tiers.
    pub async fn clean_expired(&self) -> Result<Vec<ShortCode>> {
        let deleted = self.store.delete_expired(Timestamp::now()).await?;
        for code in &deleted {
            self.purge(code);
        }
        info!(deleted = deleted.len(), "expired records cleaned");
        Ok(deleted)
    }

    /// Rebuilds the filter from every unexpired record. Returns the number of codes indexed.
    pub async fn rebuild_filter(&self) -> Result<usize> {
        let records = self.store.find_all_valid(Timestamp::now()).await?;
        let codes: Vec<ShortCode> = records.into_iter().map(|r| r.code).collect();
        self.filter.rebuild(&codes).await?;
        info!(codes = codes.len(), "filter rebuilt");
        Ok(codes.len())
    }

    /// Cleans expired records, then rebuilds the filter from what is left.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let expired = self.clean_expired().await?;
        let indexed = self.rebuild_filter().await?;
        Ok(MaintenanceReport { expired, indexed })
    }

    /// Flushes pending writes and closes the store.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        Ok(())
    }

    fn purge(&self, code: &ShortCode) {
        self.local.remove(code);
        let remote = Arc::clone(&self.remote);
        let code = code.clone();
        self.background.spawn(
            "remote_delete",
            self.config.remote_delete_timeout,
            async move { remote.del(&code).await },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        code, expired_record, live_record, stack, stack_with, BrokenCache, BrokenFilter,
        CountingStore,
    };
    use linkvault_cache::{FilterManager, MemoryBitStore, MokaUrlCache};
    use linkvault_storage::StorageError;
    use std::sync::atomic::Ordering;
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn insert_then_lookup_is_served_locally() {
        let service = stack();
        let c = code("a1B2c3D");

        service.insert(c.clone(), "https://example.com").await.unwrap();
        let origin = service.lookup(&c).await.unwrap();

        assert_eq!(origin, "https://example.com");
        assert_eq!(service.store().finds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cold_lookup_reads_store_and_backfills_caches() {
        let service = stack();
        let record = live_record("b000001", "https://cold.example");
        service.store().seed(&[record.clone()]).await;

        let origin = service.lookup(&record.code).await.unwrap();

        assert_eq!(origin, "https://cold.example");
        assert_eq!(service.store().finds.load(Ordering::SeqCst), 1);
        assert_eq!(service.local().get(&record.code).as_deref(), Some("https://cold.example"));
        awaitility::at_most(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(5))
            .until_async(|| async {
                service.remote().get_url(&record.code).await.unwrap().is_some()
            })
            .await;

        service.lookup(&record.code).await.unwrap();
        assert_eq!(service.store().finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_cold_lookups_fetch_once() {
        let store = CountingStore::with_delay(Duration::from_millis(100));
        let service = Arc::new(stack_with(
            MokaUrlCache::new(),
            FilterManager::new(MemoryBitStore::new(), Default::default()).unwrap(),
            store,
        ));
        let record = live_record("c000001", "https://hot.example");
        service.store().seed(&[record.clone()]).await;

        let mut callers = JoinSet::new();
        for _ in 0..12 {
            let service = service.clone();
            let code = record.code.clone();
            callers.spawn(async move { service.lookup(&code).await });
        }
        while let Some(joined) = callers.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), "https://hot.example");
        }

        assert_eq!(service.store().finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_hit_fills_local_cache_without_store_access() {
        let service = stack();
        let c = code("d000001");
        service
            .remote()
            .set_url(&c, "https://remote.example")
            .await
            .unwrap();

        assert_eq!(service.lookup(&c).await.unwrap(), "https://remote.example");
        assert_eq!(service.local().get(&c).as_deref(), Some("https://remote.example"));
        assert_eq!(service.store().finds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn initialized_filter_short_circuits_unknown_codes() {
        let service = stack();
        service.filter().rebuild(&[code("e000001")]).await.unwrap();

        let err = service.lookup(&code("e999999")).await.unwrap_err();

        assert_eq!(err, LookupError::NotFound);
        assert_eq!(service.store().finds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn uninitialized_filter_is_skipped() {
        let service = stack();

        let err = service.lookup(&code("f000001")).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(service.store().finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filter_faults_fail_open() {
        let service = stack_with(MokaUrlCache::new(), BrokenFilter, CountingStore::new());
        let record = live_record("g000001", "https://open.example");
        service.store().seed(&[record.clone()]).await;

        assert_eq!(service.lookup(&record.code).await.unwrap(), "https://open.example");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_cache_faults_degrade_to_store() {
        let service = stack_with(
            BrokenCache,
            FilterManager::new(MemoryBitStore::new(), Default::default()).unwrap(),
            CountingStore::new(),
        );
        let record = live_record("h000001", "https://degraded.example");
        service.store().seed(&[record.clone()]).await;

        assert_eq!(
            service.lookup(&record.code).await.unwrap(),
            "https://degraded.example"
        );
        awaitility::at_most(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(5))
            .until_async(|| async { service.background().failures() >= 1 })
            .await;
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let service = stack();
        service.store().fail_reads.store(true, Ordering::SeqCst);

        let err = service.lookup(&code("i000001")).await.unwrap_err();

        assert!(matches!(
            err,
            LookupError::Storage(StorageError::Unavailable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_sets_filter_bits() {
        let service = stack();
        let c = code("j000001");

        service.insert(c.clone(), "https://filtered.example").await.unwrap();

        awaitility::at_most(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(5))
            .until_async(|| async { service.filter().exist(&c).await.unwrap() })
            .await;
    }

    #[tokio::test]
    async fn insert_rejects_invalid_origin_before_io() {
        let service = stack();

        let err = service
            .insert(code("k000001"), "not a url")
            .await
            .unwrap_err();

        assert!(matches!(err, LookupError::InvalidInput(_)));
        assert_eq!(service.store().inner.pending(), 0);
    }

    #[tokio::test]
    async fn insert_after_close_is_rejected() {
        let service = stack();
        service.close().await.unwrap();

        let err = service
            .insert(code("l000001"), "https://late.example")
            .await
            .unwrap_err();

        assert_eq!(err, LookupError::Storage(StorageError::Closed));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_evicts_both_cache_tiers() {
        let service = stack();
        let record = live_record("m000001", "https://deleted.example");
        service.store().seed(&[record.clone()]).await;
        service.lookup(&record.code).await.unwrap();
        awaitility::at_most(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(5))
            .until_async(|| async {
                service.remote().get_url(&record.code).await.unwrap().is_some()
            })
            .await;

        assert!(service.delete(&record.code).await.unwrap());

        assert!(service.local().get(&record.code).is_none());
        awaitility::at_most(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(5))
            .until_async(|| async {
                service.remote().get_url(&record.code).await.unwrap().is_none()
            })
            .await;
        assert!(service.lookup(&record.code).await.unwrap_err().is_not_found());
        assert!(!service.delete(&record.code).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clean_expired_purges_caches() {
        let service = stack();
        let stale = expired_record("n000001", "https://stale.example");
        service.store().seed(&[stale.clone()]).await;
        service.local().insert(&stale.code, stale.origin.clone());
        service
            .remote()
            .set_url(&stale.code, &stale.origin)
            .await
            .unwrap();

        let deleted = service.clean_expired().await.unwrap();

        assert_eq!(deleted, vec![stale.code.clone()]);
        assert!(service.local().get(&stale.code).is_none());
        awaitility::at_most(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(5))
            .until_async(|| async {
                service.remote().get_url(&stale.code).await.unwrap().is_none()
            })
            .await;
    }

    #[tokio::test]
    async fn rebuild_filter_indexes_valid_codes_only() {
        let service = stack();
        let live: Vec<UrlRecord> = (0..3)
            .map(|i| live_record(&format!("p00000{i}"), &format!("https://{i}.example")))
            .collect();
        let stale = expired_record("q000001", "https://stale.example");
        service.store().seed(&live).await;
        service.store().seed(&[stale.clone()]).await;

        let indexed = service.rebuild_filter().await.unwrap();

        assert_eq!(indexed, 3);
        for record in &live {
            assert!(service.filter().exist(&record.code).await.unwrap());
        }
        assert!(service.filter().is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn run_maintenance_cleans_then_rebuilds() {
        let service = stack();
        let live = live_record("r000001", "https://live.example");
        let stale = expired_record("r000002", "https://stale.example");
        service.store().seed(&[live.clone(), stale.clone()]).await;

        let report = service.run_maintenance().await.unwrap();

        assert_eq!(
            report,
            MaintenanceReport {
                expired: vec![stale.code],
                indexed: 1,
            }
        );
    }

    #[tokio::test]
    async fn lookup_by_origin_searches_every_shard() {
        let service = stack();
        let record = live_record("Z000001", "https://origin.example");
        service.store().seed(&[record.clone()]).await;

        let found = service
            .lookup_by_origin("https://origin.example")
            .await
            .unwrap();
        assert_eq!(found.code, record.code);

        assert!(service
            .lookup_by_origin("https://missing.example")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            service.lookup_by_origin("").await,
            Err(LookupError::InvalidInput(_))
        ));
    }
}
