//! In-process first lookup tier.
//!
//! Every entry gets its own lifetime: the configured TTL shifted by a uniform
//! random jitter, so entries populated together do not all expire together.

use jiff::{SignedDuration, Timestamp};
use linkvault_core::ShortCode;
use moka::sync::Cache;
use moka::Expiry;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::trace;
use typed_builder::TypedBuilder;

/// Configuration for [`LocalCache`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct LocalCacheConfig {
    /// Maximum number of entries held before eviction.
    #[builder(default = 100_000)]
    pub capacity: u64,
    /// Base lifetime of an entry.
    #[builder(default = Duration::from_secs(6 * 60 * 60))]
    pub ttl: Duration,
    /// Upper bound of the random shift applied to `ttl`, in both directions.
    #[builder(default = Duration::from_secs(60 * 60))]
    pub jitter: Duration,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone)]
struct LocalEntry {
    origin: String,
    expire_at: Timestamp,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, LocalEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LocalEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &LocalEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded in-process cache of short code to origin with jittered expiry.
#[derive(Clone)]
pub struct LocalCache {
    cache: Cache<String, LocalEntry>,
    ttl: Duration,
    jitter: Duration,
}

impl LocalCache {
    pub fn new(config: LocalCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.capacity)
            .expire_after(PerEntryExpiry)
            .build();
        Self {
            cache,
            ttl: config.ttl,
            jitter: config.jitter,
        }
    }

    /// Returns the cached origin if present and not yet expired.
    pub fn get(&self, code: &ShortCode) -> Option<String> {
        let entry = self.cache.get(code.as_str())?;
        if entry.expire_at <= Timestamp::now() {
            self.cache.invalidate(code.as_str());
            return None;
        }
        trace!(code = %code, "local cache hit");
        Some(entry.origin)
    }

    /// Inserts or overwrites `code` with a freshly jittered lifetime.
    pub fn insert(&self, code: &ShortCode, origin: impl Into<String>) {
        let ttl = self.jittered_ttl();
        let expire_at = Timestamp::now()
            + SignedDuration::try_from(ttl).unwrap_or(SignedDuration::from_secs(1));
        self.cache.insert(
            code.as_str().to_string(),
            LocalEntry {
                origin: origin.into(),
                expire_at,
                ttl,
            },
        );
    }

    pub fn remove(&self, code: &ShortCode) {
        self.cache.invalidate(code.as_str());
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    fn jittered_ttl(&self) -> Duration {
        let base = self.ttl.as_secs() as i64;
        let bound = self.jitter.as_secs() as i64;
        let shift = if bound == 0 {
            0
        } else {
            rand::rng().random_range(-bound..=bound)
        };
        let seconds = base + shift;
        if seconds <= 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(seconds as u64)
        }
    }
}
