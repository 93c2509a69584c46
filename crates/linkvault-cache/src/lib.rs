//! Cache tiers and the negative-existence filter used by the resolver.

pub mod bloom;
pub mod cache;
pub mod error;
pub mod local;
pub mod moka;
pub mod redis;

pub use bloom::{
    BitStore, BloomFilter, ExistenceFilter, FilterConfig, FilterManager, FilterStats,
    MemoryBitStore, RedisBitStore,
};
pub use cache::UrlCache;
pub use error::{CacheError, FilterError, Result};
pub use local::{LocalCache, LocalCacheConfig};
pub use moka::MokaUrlCache;
pub use redis::RedisUrlCache;
