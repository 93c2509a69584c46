use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{Shard, ShortCode, UrlRecord};
use std::collections::HashMap;
use tracing::warn;

use crate::Result;

/// Result of upserting one shard group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Rows newly written.
    pub written: usize,
    /// Records already stored with the same code and origin.
    pub duplicates: usize,
    /// Records dropped because their code or origin is held by a different row.
    pub conflicts: usize,
}

/// Access to the physical tables, one call per shard.
///
/// Implementations never move rows between shards; callers route every code
/// to [`ShortCode::shard`].
#[async_trait]
pub trait ShardBackend: Send + Sync + 'static {
    /// Inserts `records` into `shard` in one transaction, leaving existing rows untouched.
    async fn upsert(&self, shard: Shard, records: &[UrlRecord]) -> Result<UpsertOutcome>;

    /// Point lookup of an unexpired record.
    async fn find_by_code(&self, code: &ShortCode, now: Timestamp) -> Result<Option<UrlRecord>>;

    async fn find_by_origin(
        &self,
        shard: Shard,
        origin: &str,
        now: Timestamp,
    ) -> Result<Option<UrlRecord>>;

    async fn find_expired(&self, shard: Shard, now: Timestamp) -> Result<Vec<UrlRecord>>;

    async fn find_valid(&self, shard: Shard, now: Timestamp) -> Result<Vec<UrlRecord>>;

    /// Returns whether a row existed.
    async fn delete(&self, code: &ShortCode) -> Result<bool>;

    /// Deletes up to `limit` expired rows of `shard`, oldest first, returning their codes.
    async fn delete_expired_chunk(
        &self,
        shard: Shard,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<ShortCode>>;
}

/// Classifies the records of a group that was only partly written.
///
/// `stored` maps every submitted code that exists after the insert to its
/// stored origin.
pub(crate) fn classify_shortfall(
    shard: Shard,
    submitted: &[UrlRecord],
    written: usize,
    stored: &HashMap<String, String>,
) -> UpsertOutcome {
    let mut outcome = UpsertOutcome {
        written,
        ..UpsertOutcome::default()
    };

    for record in submitted {
        match stored.get(record.code.as_str()) {
            Some(origin) if *origin == record.origin => {}
            Some(origin) => {
                warn!(
                    shard = %shard,
                    code = %record.code,
                    stored_origin = %origin,
                    submitted_origin = %record.origin,
                    "short code already maps to a different origin, keeping stored row"
                );
                outcome.conflicts += 1;
            }
            None => {
                warn!(
                    shard = %shard,
                    code = %record.code,
                    origin = %record.origin,
                    "origin already stored under another code, record dropped"
                );
                outcome.conflicts += 1;
            }
        }
    }

    outcome.duplicates = submitted
        .len()
        .saturating_sub(outcome.written + outcome.conflicts);
    outcome
}
