use crate::Result;
use async_trait::async_trait;
use linkvault_core::ShortCode;

/// A shared cache tier mapping short codes to origin URLs.
///
/// Implementations own their entry lifetime; `refresh` extends it for an
/// entry that has just been read.
#[async_trait]
pub trait UrlCache: Send + Sync + 'static {
    /// Get the origin for `code`.
    ///
    /// Returns `Ok(None)` if the key is not in the cache.
    async fn get_url(&self, code: &ShortCode) -> Result<Option<String>>;

    /// Store the origin for `code`.
    async fn set_url(&self, code: &ShortCode, origin: &str) -> Result<()>;

    /// Remove `code` from the cache. Removing a missing key is not an error.
    async fn del(&self, code: &ShortCode) -> Result<()>;

    /// Reset the lifetime of an existing entry.
    async fn refresh(&self, code: &ShortCode) -> Result<()>;
}
