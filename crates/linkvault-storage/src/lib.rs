//! Sharded, write-buffered persistence of short code records.
//!
//! Every record lives in the table of the shard named by the first symbol of
//! its code. [`ShardedStore`] buffers inserts and flushes them in
//! shard-grouped batches; reads by code hit one table, reads by origin fan
//! out across all of them.

mod backend;
mod error;
mod fanout;
mod memory;
mod mysql;
mod pool;
mod ring;
mod sharded;
mod store;

pub use backend::{ShardBackend, UpsertOutcome};
pub use error::{Result, StorageError};
pub use memory::InMemoryShardBackend;
pub use mysql::MySqlShardBackend;
pub use ring::RingBuffer;
pub use sharded::{FlushSummary, ShardedStore, StoreConfig};
pub use store::LinkStore;
