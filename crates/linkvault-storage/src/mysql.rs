use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{Shard, ShortCode, UrlRecord};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::info;

use crate::backend::{classify_shortfall, ShardBackend, UpsertOutcome};
use crate::{Result, StorageError};

const SHARD_DDL: &str = include_str!("../ddl/mysql/short_url_shard.sql");

/// MySQL implementation of [`ShardBackend`], one table per shard.
///
/// Table names come from [`Shard::table_name`] and are interpolated into the
/// statements; every value is bound.
#[derive(Debug, Clone)]
pub struct MySqlShardBackend {
    pool: MySqlPool,
}

impl MySqlShardBackend {
    /// Creates a backend from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a backend by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Creates every shard table that does not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for shard in Shard::all() {
            let ddl = SHARD_DDL.replace("{table}", &shard.table_name());
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        info!(tables = linkvault_core::SHARD_COUNT, "shard tables migrated");
        Ok(())
    }
}

fn parse_record(row: &MySqlRow) -> Result<UrlRecord> {
    let code: String = row.try_get("short_url").map_err(map_sqlx_error)?;
    let origin: String = row.try_get("origin_url").map_err(map_sqlx_error)?;
    let expired_at: i64 = row.try_get("expired_at").map_err(map_sqlx_error)?;

    let code = ShortCode::new(code)
        .map_err(|e| StorageError::InvalidData(format!("stored short code is invalid: {e}")))?;
    let expire_at = Timestamp::from_second(expired_at).map_err(|e| {
        StorageError::InvalidData(format!("invalid expired_at timestamp '{}': {e}", expired_at))
    })?;

    Ok(UrlRecord {
        code,
        origin,
        expire_at,
    })
}

fn parse_records(rows: &[MySqlRow]) -> Result<Vec<UrlRecord>> {
    rows.iter().map(parse_record).collect()
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl ShardBackend for MySqlShardBackend {
    async fn upsert(&self, shard: Shard, records: &[UrlRecord]) -> Result<UpsertOutcome> {
        if records.is_empty() {
            return Ok(UpsertOutcome::default());
        }
        let table = shard.table_name();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Duplicate keys are skipped, so rows_affected counts only new rows.
        let mut insert: QueryBuilder<MySql> = QueryBuilder::new(format!(
            "INSERT IGNORE INTO `{table}` (short_url, origin_url, expired_at) "
        ));
        insert.push_values(records, |mut row, record| {
            row.push_bind(record.code.as_str())
                .push_bind(record.origin.as_str())
                .push_bind(record.expire_at.as_second());
        });
        let written = insert
            .build()
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected() as usize;

        let outcome = if written < records.len() {
            let mut select: QueryBuilder<MySql> = QueryBuilder::new(format!(
                "SELECT short_url, origin_url FROM `{table}` WHERE short_url IN ("
            ));
            let mut codes = select.separated(", ");
            for record in records {
                codes.push_bind(record.code.as_str());
            }
            codes.push_unseparated(")");

            let rows = select
                .build()
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            let mut stored = HashMap::with_capacity(rows.len());
            for row in &rows {
                let code: String = row.try_get("short_url").map_err(map_sqlx_error)?;
                let origin: String = row.try_get("origin_url").map_err(map_sqlx_error)?;
                stored.insert(code, origin);
            }
            classify_shortfall(shard, records, written, &stored)
        } else {
            UpsertOutcome {
                written,
                ..UpsertOutcome::default()
            }
        };

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(outcome)
    }

    async fn find_by_code(&self, code: &ShortCode, now: Timestamp) -> Result<Option<UrlRecord>> {
        let sql = format!(
            r#"
            SELECT short_url, origin_url, expired_at
            FROM `{}`
            WHERE short_url = ?
              AND expired_at > ?
            LIMIT 1
            "#,
            code.shard().table_name()
        );

        let row = sqlx::query(&sql)
            .bind(code.as_str())
            .bind(now.as_second())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(parse_record).transpose()
    }

    async fn find_by_origin(
        &self,
        shard: Shard,
        origin: &str,
        now: Timestamp,
    ) -> Result<Option<UrlRecord>> {
        let sql = format!(
            r#"
            SELECT short_url, origin_url, expired_at
            FROM `{}`
            WHERE origin_url = ?
              AND expired_at > ?
            LIMIT 1
            "#,
            shard.table_name()
        );

        let row = sqlx::query(&sql)
            .bind(origin)
            .bind(now.as_second())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(parse_record).transpose()
    }

    async fn find_expired(&self, shard: Shard, now: Timestamp) -> Result<Vec<UrlRecord>> {
        let sql = format!(
            "SELECT short_url, origin_url, expired_at FROM `{}` WHERE expired_at <= ?",
            shard.table_name()
        );
        let rows = sqlx::query(&sql)
            .bind(now.as_second())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        parse_records(&rows)
    }

    async fn find_valid(&self, shard: Shard, now: Timestamp) -> Result<Vec<UrlRecord>> {
        let sql = format!(
            "SELECT short_url, origin_url, expired_at FROM `{}` WHERE expired_at > ?",
            shard.table_name()
        );
        let rows = sqlx::query(&sql)
            .bind(now.as_second())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        parse_records(&rows)
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let sql = format!(
            "DELETE FROM `{}` WHERE short_url = ?",
            code.shard().table_name()
        );
        let result = sqlx::query(&sql)
            .bind(code.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_chunk(
        &self,
        shard: Shard,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<ShortCode>> {
        let table = shard.table_name();
        let select = format!(
            r#"
            SELECT short_url
            FROM `{table}`
            WHERE expired_at <= ?
            ORDER BY expired_at ASC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&select)
            .bind(now.as_second())
            .bind(limit as u64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut codes = Vec::with_capacity(rows.len());
        for row in &rows {
            let code: String = row.try_get("short_url").map_err(map_sqlx_error)?;
            codes.push(ShortCode::new(code).map_err(|e| {
                StorageError::InvalidData(format!("stored short code is invalid: {e}"))
            })?);
        }

        let mut delete: QueryBuilder<MySql> =
            QueryBuilder::new(format!("DELETE FROM `{table}` WHERE short_url IN ("));
        let mut separated = delete.separated(", ");
        for code in &codes {
            separated.push_bind(code.as_str());
        }
        separated.push_unseparated(")");
        delete
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(codes)
    }
}
