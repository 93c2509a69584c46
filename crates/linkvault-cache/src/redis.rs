use async_trait::async_trait;
use linkvault_core::ShortCode;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::map_redis_error;
use crate::{Result, UrlCache};

/// Default lifetime of a remote cache entry.
pub const DEFAULT_REMOTE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_KEY_PREFIX: &str = "lv:url:";

/// A Redis-based implementation of [`UrlCache`].
///
/// Origins are stored as plain strings under a configurable key prefix and
/// expire after a fixed TTL. `refresh` re-arms that TTL.
#[derive(Debug, Clone)]
pub struct RedisUrlCache {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
    ttl: Duration,
}

impl RedisUrlCache {
    /// Creates a new Redis URL cache.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl: DEFAULT_REMOTE_TTL,
        }
    }

    /// Creates a new Redis URL cache with a custom key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `key_prefix` - Custom prefix for cache keys (e.g., "myapp:url:")
    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            ttl: DEFAULT_REMOTE_TTL,
        }
    }

    /// Overrides the entry lifetime. Sub-second values are rounded up to one second.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Generates the cache key for a short code.
    fn cache_key(&self, code: &ShortCode) -> String {
        format!("{}{}", self.key_prefix, code.as_str())
    }

    fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl UrlCache for RedisUrlCache {
    async fn get_url(&self, code: &ShortCode) -> Result<Option<String>> {
        let key = self.cache_key(code);
        trace!(code = %code, "Fetching origin from Redis cache");

        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(origin)) => {
                debug!(code = %code, "Cache hit in Redis");
                Ok(Some(origin))
            }
            Ok(None) => {
                trace!(code = %code, "Cache miss in Redis");
                Ok(None)
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Redis error on get");
                Err(map_redis_error("failed to fetch value from Redis", e))
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, origin: &str) -> Result<()> {
        let key = self.cache_key(code);
        trace!(code = %code, "Storing origin in Redis cache");

        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("SET")
            .arg(&key)
            .arg(origin)
            .arg("EX")
            .arg(self.ttl_seconds())
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                debug!(code = %code, "Cached origin in Redis");
                Ok(())
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to cache origin in Redis");
                Err(map_redis_error("failed to write value to Redis", e))
            }
        }
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        let key = self.cache_key(code);
        trace!(code = %code, "Removing origin from Redis cache");

        let mut conn = self.conn.clone();
        match conn.del::<_, ()>(&key).await {
            Ok(()) => {
                debug!(code = %code, "Removed origin from Redis cache");
                Ok(())
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to remove origin from Redis cache");
                Err(map_redis_error("failed to delete value from Redis", e))
            }
        }
    }

    async fn refresh(&self, code: &ShortCode) -> Result<()> {
        let key = self.cache_key(code);

        let mut conn = self.conn.clone();
        let result: redis::RedisResult<i64> = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_seconds())
            .query_async(&mut conn)
            .await;

        match result {
            Ok(1) => {
                trace!(code = %code, "Refreshed Redis cache entry");
                Ok(())
            }
            Ok(_) => {
                trace!(code = %code, "Nothing to refresh in Redis cache");
                Ok(())
            }
            Err(e) => Err(map_redis_error("failed to refresh value in Redis", e)),
        }
    }
}
