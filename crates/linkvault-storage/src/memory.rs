use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{Shard, ShortCode, UrlRecord, SHARD_COUNT};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::backend::{classify_shortfall, ShardBackend, UpsertOutcome};
use crate::Result;

#[derive(Debug, Default)]
struct ShardTable {
    by_code: HashMap<String, UrlRecord>,
    /// origin -> code, the per-table unique index.
    by_origin: HashMap<String, String>,
}

/// In-process [`ShardBackend`] with one locked table per shard.
#[derive(Debug)]
pub struct InMemoryShardBackend {
    tables: Vec<Mutex<ShardTable>>,
}

impl InMemoryShardBackend {
    pub fn new() -> Self {
        Self {
            tables: (0..SHARD_COUNT).map(|_| Mutex::default()).collect(),
        }
    }

    fn table(&self, shard: Shard) -> &Mutex<ShardTable> {
        &self.tables[shard.index()]
    }

    /// Total rows across every shard, expired or not.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.lock().by_code.len()).sum()
    }
}

impl Default for InMemoryShardBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardBackend for InMemoryShardBackend {
    async fn upsert(&self, shard: Shard, records: &[UrlRecord]) -> Result<UpsertOutcome> {
        let mut table = self.table(shard).lock();

        let mut written = 0;
        for record in records {
            let code = record.code.as_str();
            if table.by_code.contains_key(code) || table.by_origin.contains_key(&record.origin) {
                continue;
            }
            table
                .by_origin
                .insert(record.origin.clone(), code.to_string());
            table.by_code.insert(code.to_string(), record.clone());
            written += 1;
        }

        if written == records.len() {
            return Ok(UpsertOutcome {
                written,
                ..UpsertOutcome::default()
            });
        }

        let stored: HashMap<String, String> = records
            .iter()
            .filter_map(|r| {
                table
                    .by_code
                    .get(r.code.as_str())
                    .map(|existing| (r.code.as_str().to_string(), existing.origin.clone()))
            })
            .collect();
        Ok(classify_shortfall(shard, records, written, &stored))
    }

    async fn find_by_code(&self, code: &ShortCode, now: Timestamp) -> Result<Option<UrlRecord>> {
        let table = self.table(code.shard()).lock();
        Ok(table
            .by_code
            .get(code.as_str())
            .filter(|r| !r.is_expired_at(now))
            .cloned())
    }

    async fn find_by_origin(
        &self,
        shard: Shard,
        origin: &str,
        now: Timestamp,
    ) -> Result<Option<UrlRecord>> {
        let table = self.table(shard).lock();
        Ok(table
            .by_origin
            .get(origin)
            .and_then(|code| table.by_code.get(code))
            .filter(|r| !r.is_expired_at(now))
            .cloned())
    }

    async fn find_expired(&self, shard: Shard, now: Timestamp) -> Result<Vec<UrlRecord>> {
        let table = self.table(shard).lock();
        Ok(table
            .by_code
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn find_valid(&self, shard: Shard, now: Timestamp) -> Result<Vec<UrlRecord>> {
        let table = self.table(shard).lock();
        Ok(table
            .by_code
            .values()
            .filter(|r| !r.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let mut table = self.table(code.shard()).lock();
        match table.by_code.remove(code.as_str()) {
            Some(record) => {
                table.by_origin.remove(&record.origin);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expired_chunk(
        &self,
        shard: Shard,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<ShortCode>> {
        let mut table = self.table(shard).lock();

        let mut expired: Vec<(Timestamp, ShortCode)> = table
            .by_code
            .values()
            .filter(|r| r.is_expired_at(now))
            .map(|r| (r.expire_at, r.code.clone()))
            .collect();
        expired.sort();
        expired.truncate(limit);

        let mut deleted = Vec::with_capacity(expired.len());
        for (_, code) in expired {
            if let Some(record) = table.by_code.remove(code.as_str()) {
                table.by_origin.remove(&record.origin);
                deleted.push(code);
            }
        }
        Ok(deleted)
    }
}
