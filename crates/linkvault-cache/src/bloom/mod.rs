//! Negative-existence filter over all known short codes.
//!
//! The bit array lives behind a [`BitStore`] (Redis in production). Each
//! member addresses `k` bits derived from a hash chain, and the
//! [`FilterManager`] swaps in a freshly built array without ever exposing a
//! half-populated one.

mod filter;
mod hasher;
mod manager;
mod redis_store;
mod store;

pub use filter::{estimate_false_positive_rate, BloomFilter, FilterStats, BATCH_SET_GROUP};
pub use hasher::{chain_offsets, ChainHasher, Fnv1a32, Md5Prefix, Sha256Prefix};
pub use manager::{ExistenceFilter, FilterConfig, FilterManager};
pub use redis_store::RedisBitStore;
pub use store::{BitStore, MemoryBitStore};
