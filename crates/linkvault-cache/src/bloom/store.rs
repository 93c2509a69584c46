use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::FilterError;

pub type Result<T> = std::result::Result<T, FilterError>;

/// Remote bit array operations the filter is built on.
///
/// Every method on a single key must be atomic with respect to the others:
/// `check_bits` observes either none or all of a concurrent `set_bits`.
#[async_trait]
pub trait BitStore: Send + Sync + 'static {
    /// Returns `true` if every offset is set.
    async fn check_bits(&self, key: &str, offsets: &[u64]) -> Result<bool>;

    /// Sets every offset.
    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<()>;

    /// Sets several offset groups in one round trip.
    async fn set_bits_pipelined(&self, key: &str, groups: &[Vec<u64>]) -> Result<()>;

    /// Number of set bits under `key`. A missing key counts zero.
    async fn count_bits(&self, key: &str) -> Result<u64>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically moves `from` over `to`, replacing any existing value.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// In-process [`BitStore`] for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryBitStore {
    keys: Mutex<HashMap<String, Vec<u64>>>,
}

impl MemoryBitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_offsets(words: &mut Vec<u64>, offsets: &[u64]) {
        for &offset in offsets {
            let word = (offset / 64) as usize;
            if word >= words.len() {
                words.resize(word + 1, 0);
            }
            words[word] |= 1u64 << (offset % 64);
        }
    }
}

#[async_trait]
impl BitStore for MemoryBitStore {
    async fn check_bits(&self, key: &str, offsets: &[u64]) -> Result<bool> {
        let keys = self.keys.lock();
        let Some(words) = keys.get(key) else {
            return Ok(false);
        };
        Ok(offsets.iter().all(|&offset| {
            words
                .get((offset / 64) as usize)
                .is_some_and(|word| word & (1u64 << (offset % 64)) != 0)
        }))
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<()> {
        let mut keys = self.keys.lock();
        Self::set_offsets(keys.entry(key.to_string()).or_default(), offsets);
        Ok(())
    }

    async fn set_bits_pipelined(&self, key: &str, groups: &[Vec<u64>]) -> Result<()> {
        let mut keys = self.keys.lock();
        let words = keys.entry(key.to_string()).or_default();
        for offsets in groups {
            Self::set_offsets(words, offsets);
        }
        Ok(())
    }

    async fn count_bits(&self, key: &str) -> Result<u64> {
        let keys = self.keys.lock();
        Ok(keys
            .get(key)
            .map(|words| words.iter().map(|w| w.count_ones() as u64).sum())
            .unwrap_or(0))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.keys.lock().remove(key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut keys = self.keys.lock();
        let words = keys
            .remove(from)
            .ok_or_else(|| FilterError::Backend(format!("no such key: {from}")))?;
        keys.insert(to.to_string(), words);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_check() {
        let store = MemoryBitStore::new();
        store.set_bits("k", &[1, 64, 999]).await.unwrap();

        assert!(store.check_bits("k", &[1, 64, 999]).await.unwrap());
        assert!(!store.check_bits("k", &[1, 2]).await.unwrap());
        assert!(!store.check_bits("other", &[1]).await.unwrap());
        assert_eq!(store.count_bits("k").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rename_replaces_destination() {
        let store = MemoryBitStore::new();
        store.set_bits("live", &[1]).await.unwrap();
        store.set_bits("temp", &[2]).await.unwrap();

        store.rename("temp", "live").await.unwrap();

        assert!(store.check_bits("live", &[2]).await.unwrap());
        assert!(!store.check_bits("live", &[1]).await.unwrap());
        assert_eq!(store.count_bits("temp").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rename_missing_source_fails() {
        let store = MemoryBitStore::new();
        let err = store.rename("missing", "live").await.unwrap_err();
        assert!(matches!(err, FilterError::Backend(_)));
    }
}
