use async_trait::async_trait;
use linkvault_core::ShortCode;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use super::filter::{BloomFilter, FilterStats};
use super::hasher::{ChainHasher, Fnv1a32};
use super::store::{BitStore, Result};
use crate::FilterError;

const TEMP_SUFFIX: &str = "_temp";

/// Set membership over every known short code.
///
/// A negative answer is authoritative for codes inserted before the last
/// completed rebuild or `set`. A positive answer may be a false positive.
#[async_trait]
pub trait ExistenceFilter: Send + Sync + 'static {
    async fn exist(&self, code: &ShortCode) -> Result<bool>;

    async fn set(&self, code: &ShortCode) -> Result<()>;

    /// Replaces the filter contents with exactly `codes`.
    async fn rebuild(&self, codes: &[ShortCode]) -> Result<()>;

    async fn stats(&self) -> Result<FilterStats>;

    /// A filter with no set bits has never been populated and must not be trusted.
    async fn is_initialized(&self) -> Result<bool> {
        Ok(self.stats().await?.is_initialized())
    }
}

/// Parameters of the live filter.
#[derive(Debug, Clone, TypedBuilder)]
pub struct FilterConfig {
    /// Name of the live bit array.
    #[builder(default = "linkvault:bloom".to_string(), setter(into))]
    pub key: String,
    /// Bit array size `m`.
    #[builder(default = 1_000_000)]
    pub bits: u64,
    /// Hash count `k`.
    #[builder(default = 7)]
    pub hashes: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Owns the live filter key and the rebuild protocol for it.
pub struct FilterManager<B, H = Fnv1a32> {
    filter: BloomFilter<B, H>,
    key: String,
    temp_key: String,
    rebuilding: AtomicBool,
}

struct RebuildGuard<'a>(&'a AtomicBool);

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<B: BitStore> FilterManager<B> {
    pub fn new(store: B, config: FilterConfig) -> Result<Self> {
        Self::with_hasher(store, Fnv1a32, config)
    }
}

impl<B: BitStore, H: ChainHasher> FilterManager<B, H> {
    pub fn with_hasher(store: B, hasher: H, config: FilterConfig) -> Result<Self> {
        if config.key.is_empty() {
            return Err(FilterError::InvalidArgument(
                "filter key cannot be empty".to_string(),
            ));
        }
        let filter = BloomFilter::with_hasher(store, hasher, config.bits, config.hashes)?;
        let temp_key = format!("{}{}", config.key, TEMP_SUFFIX);
        Ok(Self {
            filter,
            key: config.key,
            temp_key,
            rebuilding: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn filter(&self) -> &BloomFilter<B, H> {
        &self.filter
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }

    async fn populate_and_swap(&self, codes: &[ShortCode]) -> Result<()> {
        if let Err(e) = self.filter.clear(&self.temp_key).await {
            warn!(key = %self.temp_key, error = %e, "failed to clear scratch filter key");
        }

        if codes.is_empty() {
            // RENAME needs an existing source key; an empty rebuild empties the live key.
            return self.filter.clear(&self.key).await;
        }

        let values: Vec<&str> = codes.iter().map(ShortCode::as_str).collect();
        self.filter.batch_set(&self.temp_key, &values).await?;
        self.filter.rename(&self.temp_key, &self.key).await
    }
}

#[async_trait]
impl<B: BitStore, H: ChainHasher> ExistenceFilter for FilterManager<B, H> {
    async fn exist(&self, code: &ShortCode) -> Result<bool> {
        self.filter.exist(&self.key, code.as_str()).await
    }

    async fn set(&self, code: &ShortCode) -> Result<()> {
        self.filter.set(&self.key, code.as_str()).await
    }

    async fn rebuild(&self, codes: &[ShortCode]) -> Result<()> {
        if self.rebuilding.swap(true, Ordering::AcqRel) {
            return Err(FilterError::RebuildInProgress);
        }
        let _guard = RebuildGuard(&self.rebuilding);

        info!(key = %self.key, codes = codes.len(), "rebuilding filter");
        match self.populate_and_swap(codes).await {
            Ok(()) => {
                debug!(key = %self.key, "filter swapped in");
                Ok(())
            }
            Err(e) => {
                if let Err(clear_err) = self.filter.clear(&self.temp_key).await {
                    warn!(key = %self.temp_key, error = %clear_err, "failed to clear scratch filter key after error");
                }
                Err(e)
            }
        }
    }

    async fn stats(&self) -> Result<FilterStats> {
        self.filter.stats(&self.key).await
    }
}
