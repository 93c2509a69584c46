use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::trace;

use super::store::{BitStore, Result};

const CHECK_SCRIPT: &str = include_str!("scripts/bloom_check.lua");
const SET_SCRIPT: &str = include_str!("scripts/bloom_set.lua");

/// [`BitStore`] backed by a Redis bitmap.
///
/// Checks and sets run as Lua scripts so every offset of one member is
/// read or written atomically.
#[derive(Clone)]
pub struct RedisBitStore {
    conn: redis::aio::MultiplexedConnection,
    check: Script,
    set: Script,
}

impl RedisBitStore {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            check: Script::new(CHECK_SCRIPT),
            set: Script::new(SET_SCRIPT),
        }
    }
}

#[async_trait]
impl BitStore for RedisBitStore {
    async fn check_bits(&self, key: &str, offsets: &[u64]) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.check.prepare_invoke();
        invocation.key(key).arg(offsets.len());
        for offset in offsets {
            invocation.arg(*offset);
        }
        let found: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(found == 1)
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut invocation = self.set.prepare_invoke();
        invocation.key(key).arg(offsets.len());
        for offset in offsets {
            invocation.arg(*offset);
        }
        let _: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn set_bits_pipelined(&self, key: &str, groups: &[Vec<u64>]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        // EVALSHA inside a pipeline cannot fall back to EVAL, so load first.
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(SET_SCRIPT)
            .query_async(&mut conn)
            .await?;

        let mut pipe = redis::pipe();
        for offsets in groups {
            pipe.cmd("EVALSHA")
                .arg(&sha)
                .arg(1)
                .arg(key)
                .arg(offsets.len());
            for offset in offsets {
                pipe.arg(*offset);
            }
            pipe.ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        trace!(key, groups = groups.len(), "pipelined filter insert");
        Ok(())
    }

    async fn count_bits(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("BITCOUNT")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("RENAME")
            .arg(from)
            .arg(to)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
