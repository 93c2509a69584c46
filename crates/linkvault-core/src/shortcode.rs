use crate::error::CoreError;
use crate::shard::Shard;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Length of every short code.
pub const CODE_LENGTH: usize = 7;

/// A validated short code identifier for a shortened URL.
///
/// Codes are produced by an external encoder that embeds its own check
/// digit. This type only enforces the syntactic contract the store relies
/// on: exactly [`CODE_LENGTH`] base62 symbols, so that the first symbol
/// always names a shard.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortCode(String);

impl ShortCode {
    /// Creates a new `ShortCode` after validating the input.
    pub fn new(code: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(Self(code))
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The shard that owns this code.
    pub fn shard(&self) -> Shard {
        // Validation guarantees the first symbol is part of the alphabet.
        self.0
            .chars()
            .next()
            .and_then(Shard::from_symbol)
            .unwrap_or_else(|| unreachable!("short code {:?} passed validation", self.0))
    }

    fn validate(code: &str) -> std::result::Result<(), CoreError> {
        if code.len() != CODE_LENGTH {
            return Err(CoreError::InvalidShortCode(format!(
                "length must be {}, got {}",
                CODE_LENGTH,
                code.len()
            )));
        }

        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidShortCode(format!(
                "must contain only base62 characters: '{}'",
                code
            )));
        }

        Ok(())
    }
}

impl TryFrom<String> for ShortCode {
    type Error = CoreError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ShortCode> for String {
    fn from(code: ShortCode) -> Self {
        code.0
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
