use md5::Md5;
use sha2::{Digest, Sha256};

/// A 32-bit hash used to derive filter offsets.
///
/// The filter feeds each output back in as the decimal rendering of the
/// signed value, so implementations only need to hash a single byte slice.
pub trait ChainHasher: Send + Sync + 'static {
    fn hash(&self, input: &[u8]) -> i32;
}

/// FNV-1a (32-bit).
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a32;

impl ChainHasher for Fnv1a32 {
    fn hash(&self, input: &[u8]) -> i32 {
        let mut hash: u32 = 0x811c_9dc5;
        for &byte in input {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        hash as i32
    }
}

/// First four bytes of SHA-256, big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Prefix;

impl ChainHasher for Sha256Prefix {
    fn hash(&self, input: &[u8]) -> i32 {
        let digest = Sha256::digest(input);
        i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// First four bytes of MD5, big-endian.
///
/// Keeps bit arrays interchangeable with MD5-chained filters in other services.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Prefix;

impl ChainHasher for Md5Prefix {
    fn hash(&self, input: &[u8]) -> i32 {
        let digest = Md5::digest(input);
        i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// Derives `hashes` offsets in `[0, bits)` for `value` by chaining `hasher`.
pub fn chain_offsets<H: ChainHasher + ?Sized>(
    hasher: &H,
    value: &str,
    bits: u64,
    hashes: u32,
) -> Vec<u64> {
    let modulus = bits as i64;
    let mut offsets = Vec::with_capacity(hashes as usize);
    let mut input = value.to_string();
    for _ in 0..hashes {
        let h = hasher.hash(input.as_bytes());
        offsets.push((h as i64).rem_euclid(modulus) as u64);
        input = h.to_string();
    }
    offsets
}
