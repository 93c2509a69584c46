use async_trait::async_trait;
use linkvault_core::ShortCode;
use moka::future::Cache;
use std::time::Duration;
use tracing::{debug, trace};

use crate::{Result, UrlCache};

/// An in-process implementation of the shared cache tier using Moka.
///
/// Stands in for Redis on single-node deployments and in tests. Entries
/// expire after the configured TTL; `refresh` re-inserts an existing entry so
/// its TTL starts over.
#[derive(Debug, Clone)]
pub struct MokaUrlCache {
    cache: Cache<String, String>,
}

impl MokaUrlCache {
    /// Creates a new Moka URL cache with default settings.
    ///
    /// The cache will have a default maximum capacity of 10,000 entries.
    pub fn new() -> Self {
        let cache = Cache::builder().max_capacity(10_000).build();
        Self { cache }
    }

    /// Creates a new Moka URL cache with time-to-live (TTL) settings.
    ///
    /// # Arguments
    ///
    /// * `max_capacity` - Maximum number of entries the cache can hold
    /// * `ttl` - Time-to-live for cache entries
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }
}

impl Default for MokaUrlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlCache for MokaUrlCache {
    async fn get_url(&self, code: &ShortCode) -> Result<Option<String>> {
        trace!(code = %code, "Fetching origin from Moka cache");

        match self.cache.get(code.as_str()).await {
            Some(origin) => {
                debug!(code = %code, "Cache hit in Moka");
                Ok(Some(origin))
            }
            None => {
                trace!(code = %code, "Cache miss in Moka");
                Ok(None)
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, origin: &str) -> Result<()> {
        self.cache
            .insert(code.as_str().to_string(), origin.to_string())
            .await;
        debug!(code = %code, "Cached origin in Moka");
        Ok(())
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        self.cache.invalidate(code.as_str()).await;
        debug!(code = %code, "Removed origin from Moka cache (if present)");
        Ok(())
    }

    async fn refresh(&self, code: &ShortCode) -> Result<()> {
        if let Some(origin) = self.cache.get(code.as_str()).await {
            self.cache.insert(code.as_str().to_string(), origin).await;
            trace!(code = %code, "Refreshed Moka cache entry");
        }
        Ok(())
    }
}
