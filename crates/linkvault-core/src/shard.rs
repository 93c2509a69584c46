use std::fmt::Display;

/// The base62 alphabet. Each symbol names exactly one shard.
pub const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of physical partitions of the persistent store.
pub const SHARD_COUNT: usize = BASE62_ALPHABET.len();

const TABLE_PREFIX: &str = "short_url_";

/// One of the 62 disjoint partitions of the persistent store.
///
/// A shard is selected by the first character of a short code, so a given
/// code maps to the same shard for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shard(u8);

impl Shard {
    /// Returns the shard owning codes that start with `symbol`.
    ///
    /// Returns `None` if `symbol` is not part of the base62 alphabet.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        if !symbol.is_ascii() {
            return None;
        }
        BASE62_ALPHABET
            .iter()
            .position(|&c| c == symbol as u8)
            .map(|index| Self(index as u8))
    }

    /// Returns the shard at `index` in alphabet order.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < SHARD_COUNT).then_some(Self(index as u8))
    }

    /// Iterates over every shard in alphabet order.
    pub fn all() -> impl Iterator<Item = Shard> {
        (0..SHARD_COUNT as u8).map(Shard)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The alphabet symbol this shard is keyed by.
    pub fn symbol(self) -> char {
        BASE62_ALPHABET[self.index()] as char
    }

    /// Name of the physical table backing this shard, e.g. `short_url_a`.
    pub fn table_name(self) -> String {
        format!("{TABLE_PREFIX}{}", self.symbol())
    }
}

impl Display for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
