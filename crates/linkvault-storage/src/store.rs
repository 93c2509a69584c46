use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{ShortCode, UrlRecord};

use crate::Result;

/// The authoritative code to origin mapping as seen by the resolver.
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Accepts `record` for persistence. Buffered implementations return once
    /// the record is queued.
    async fn insert(&self, record: UrlRecord) -> Result<()>;

    async fn find_by_code(&self, code: &ShortCode, now: Timestamp) -> Result<Option<UrlRecord>>;

    async fn find_by_origin(&self, origin: &str, now: Timestamp) -> Result<Option<UrlRecord>>;

    async fn find_expired(&self, now: Timestamp) -> Result<Vec<UrlRecord>>;

    async fn find_all_valid(&self, now: Timestamp) -> Result<Vec<UrlRecord>>;

    /// Returns whether a record existed.
    async fn delete(&self, code: &ShortCode) -> Result<bool>;

    /// Removes every expired record and returns the removed codes.
    async fn delete_expired(&self, now: Timestamp) -> Result<Vec<ShortCode>>;

    /// Flushes buffered writes and stops accepting new ones.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
