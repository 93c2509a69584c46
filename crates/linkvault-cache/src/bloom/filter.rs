use super::hasher::{chain_offsets, ChainHasher, Fnv1a32};
use super::store::{BitStore, Result};
use crate::FilterError;

/// Number of members inserted per pipelined round trip in [`BloomFilter::batch_set`].
pub const BATCH_SET_GROUP: usize = 1000;

/// Point-in-time statistics of one filter key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterStats {
    pub total_bits: u64,
    pub hash_count: u32,
    pub set_bits: u64,
    /// Estimated false-positive rate derived from `set_bits`.
    pub false_positive_rate: f64,
}

impl FilterStats {
    pub fn new(total_bits: u64, hash_count: u32, set_bits: u64) -> Self {
        Self {
            total_bits,
            hash_count,
            set_bits,
            false_positive_rate: estimate_false_positive_rate(total_bits, hash_count, set_bits),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.set_bits > 0
    }
}

/// `(1 - e^(-k*n/m))^k` with `n` estimated as `set_bits / k`.
pub fn estimate_false_positive_rate(total_bits: u64, hash_count: u32, set_bits: u64) -> f64 {
    if set_bits == 0 || total_bits == 0 || hash_count == 0 {
        return 0.0;
    }
    let m = total_bits as f64;
    let k = hash_count as f64;
    let n = set_bits as f64 / k;
    (1.0 - (-k * n / m).exp()).powf(k)
}

/// A Bloom filter whose bit array lives in a [`BitStore`].
///
/// The filter itself is stateless apart from its parameters; every operation
/// names the key it acts on so that a rebuild can target a scratch key.
pub struct BloomFilter<B, H = Fnv1a32> {
    store: B,
    hasher: H,
    bits: u64,
    hashes: u32,
}

impl<B: BitStore> BloomFilter<B> {
    /// Creates a filter with the default FNV-1a hash chain.
    pub fn new(store: B, bits: u64, hashes: u32) -> Result<Self> {
        Self::with_hasher(store, Fnv1a32, bits, hashes)
    }
}

impl<B: BitStore, H: ChainHasher> BloomFilter<B, H> {
    pub fn with_hasher(store: B, hasher: H, bits: u64, hashes: u32) -> Result<Self> {
        if bits == 0 || bits > i64::MAX as u64 {
            return Err(FilterError::InvalidArgument(format!(
                "bit count must be positive, got {bits}"
            )));
        }
        if hashes == 0 {
            return Err(FilterError::InvalidArgument(
                "hash count must be positive".to_string(),
            ));
        }
        Ok(Self {
            store,
            hasher,
            bits,
            hashes,
        })
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn hashes(&self) -> u32 {
        self.hashes
    }

    /// Offsets addressed by `value`.
    pub fn offsets(&self, value: &str) -> Vec<u64> {
        chain_offsets(&self.hasher, value, self.bits, self.hashes)
    }

    /// Returns `false` only if `value` was never set under `key`.
    pub async fn exist(&self, key: &str, value: &str) -> Result<bool> {
        validate(key, value)?;
        self.store.check_bits(key, &self.offsets(value)).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        validate(key, value)?;
        self.store.set_bits(key, &self.offsets(value)).await
    }

    /// Inserts `values` in pipelined groups. Empty values are skipped.
    pub async fn batch_set<S: AsRef<str>>(&self, key: &str, values: &[S]) -> Result<()> {
        validate_key(key)?;
        let offsets: Vec<Vec<u64>> = values
            .iter()
            .map(AsRef::as_ref)
            .filter(|value| !value.is_empty())
            .map(|value| self.offsets(value))
            .collect();

        for group in offsets.chunks(BATCH_SET_GROUP) {
            self.store.set_bits_pipelined(key, group).await?;
        }
        Ok(())
    }

    pub async fn clear(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.store.delete(key).await
    }

    /// Atomically replaces `to` with the contents of `from`.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate_key(from)?;
        validate_key(to)?;
        self.store.rename(from, to).await
    }

    pub async fn stats(&self, key: &str) -> Result<FilterStats> {
        validate_key(key)?;
        let set_bits = self.store.count_bits(key).await?;
        Ok(FilterStats::new(self.bits, self.hashes, set_bits))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(FilterError::InvalidArgument(
            "filter key cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate(key: &str, value: &str) -> Result<()> {
    validate_key(key)?;
    if value.is_empty() {
        return Err(FilterError::InvalidArgument(
            "filter value cannot be empty".to_string(),
        ));
    }
    Ok(())
}
