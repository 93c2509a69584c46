//! In-process service stack shared by the unit tests.

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use linkvault_cache::{
    CacheError, ExistenceFilter, FilterError, FilterManager, FilterStats, LocalCache,
    LocalCacheConfig, MemoryBitStore, MokaUrlCache, UrlCache,
};
use linkvault_core::{ShortCode, UrlRecord};
use linkvault_storage::{
    InMemoryShardBackend, LinkStore, ShardBackend, ShardedStore, StorageError, StoreConfig,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::{LinkService, ServiceConfig};

pub(crate) type TestService =
    LinkService<MokaUrlCache, FilterManager<MemoryBitStore>, CountingStore>;

pub(crate) fn code(value: &str) -> ShortCode {
    ShortCode::new(value).unwrap()
}

pub(crate) fn live_record(code_value: &str, origin: &str) -> UrlRecord {
    UrlRecord::new(
        code(code_value),
        origin,
        Timestamp::now() + SignedDuration::from_hours(1),
    )
    .unwrap()
}

pub(crate) fn expired_record(code_value: &str, origin: &str) -> UrlRecord {
    UrlRecord::new(
        code(code_value),
        origin,
        Timestamp::now() - SignedDuration::from_secs(60),
    )
    .unwrap()
}

pub(crate) fn stack() -> TestService {
    stack_with(
        MokaUrlCache::new(),
        FilterManager::new(MemoryBitStore::new(), Default::default()).unwrap(),
        CountingStore::new(),
    )
}

pub(crate) fn stack_with<C, F>(
    remote: C,
    filter: F,
    store: CountingStore,
) -> LinkService<C, F, CountingStore>
where
    C: UrlCache,
    F: ExistenceFilter,
{
    LinkService::new(
        LocalCache::new(LocalCacheConfig::default()),
        remote,
        filter,
        store,
        ServiceConfig::default(),
    )
}

/// Buffered in-memory store that counts point lookups.
pub(crate) struct CountingStore {
    pub(crate) inner: ShardedStore<InMemoryShardBackend>,
    pub(crate) finds: AtomicUsize,
    pub(crate) fail_reads: AtomicBool,
    /// Extra latency of `delete_expired`, in milliseconds.
    pub(crate) sweep_delay_ms: AtomicU64,
    delay: Duration,
}

impl CountingStore {
    pub(crate) fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        let config = StoreConfig::builder()
            .flush_interval(Duration::from_millis(10))
            .sweep_pause(Duration::from_millis(1))
            .build();
        Self {
            inner: ShardedStore::new(InMemoryShardBackend::new(), config),
            finds: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            sweep_delay_ms: AtomicU64::new(0),
            delay,
        }
    }

    /// Writes `records` straight into the shard tables, bypassing the buffer.
    pub(crate) async fn seed(&self, records: &[UrlRecord]) {
        for record in records {
            self.inner
                .backend()
                .upsert(record.code.shard(), std::slice::from_ref(record))
                .await
                .unwrap();
        }
    }
}

#[async_trait]
impl LinkStore for CountingStore {
    async fn insert(&self, record: UrlRecord) -> linkvault_storage::Result<()> {
        self.inner.insert(record).await
    }

    async fn find_by_code(
        &self,
        code: &ShortCode,
        now: Timestamp,
    ) -> linkvault_storage::Result<Option<UrlRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("store offline".to_string()));
        }
        self.inner.find_by_code(code, now).await
    }

    async fn find_by_origin(
        &self,
        origin: &str,
        now: Timestamp,
    ) -> linkvault_storage::Result<Option<UrlRecord>> {
        self.inner.find_by_origin(origin, now).await
    }

    async fn find_expired(&self, now: Timestamp) -> linkvault_storage::Result<Vec<UrlRecord>> {
        self.inner.find_expired(now).await
    }

    async fn find_all_valid(&self, now: Timestamp) -> linkvault_storage::Result<Vec<UrlRecord>> {
        self.inner.find_all_valid(now).await
    }

    async fn delete(&self, code: &ShortCode) -> linkvault_storage::Result<bool> {
        self.inner.delete(code).await
    }

    async fn delete_expired(&self, now: Timestamp) -> linkvault_storage::Result<Vec<ShortCode>> {
        let pause = self.sweep_delay_ms.load(Ordering::SeqCst);
        if pause > 0 {
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
        self.inner.delete_expired(now).await
    }

    async fn close(&self) -> linkvault_storage::Result<()> {
        self.inner.close().await
    }
}

/// Remote cache whose every call fails.
pub(crate) struct BrokenCache;

#[async_trait]
impl UrlCache for BrokenCache {
    async fn get_url(&self, _code: &ShortCode) -> linkvault_cache::Result<Option<String>> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set_url(&self, _code: &ShortCode, _origin: &str) -> linkvault_cache::Result<()> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn del(&self, _code: &ShortCode) -> linkvault_cache::Result<()> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn refresh(&self, _code: &ShortCode) -> linkvault_cache::Result<()> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// Filter whose every call fails.
pub(crate) struct BrokenFilter;

#[async_trait]
impl ExistenceFilter for BrokenFilter {
    async fn exist(&self, _code: &ShortCode) -> Result<bool, FilterError> {
        Err(FilterError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _code: &ShortCode) -> Result<(), FilterError> {
        Err(FilterError::Backend("connection refused".to_string()))
    }

    async fn rebuild(&self, _codes: &[ShortCode]) -> Result<(), FilterError> {
        Err(FilterError::Backend("connection refused".to_string()))
    }

    async fn stats(&self) -> Result<FilterStats, FilterError> {
        Err(FilterError::Backend("connection refused".to_string()))
    }
}
