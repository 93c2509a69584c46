//! Write-buffered store over 62 shard tables.
//!
//! Inserts land in a ring buffer and return immediately. A batcher task
//! moves bounded batches from the buffer into a flush queue whenever the
//! ticker fires or the buffer reaches one batch worth of records. A
//! dispatcher task hands each batch to the flush pool, which groups it by
//! shard and upserts the groups in parallel.

use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{Shard, ShortCode, UrlRecord};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use crate::backend::{ShardBackend, UpsertOutcome};
use crate::fanout;
use crate::pool::FlushPool;
use crate::ring::RingBuffer;
use crate::store::LinkStore;
use crate::{Result, StorageError};

fn default_flush_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 3)
        .unwrap_or(4)
        .max(4)
}

/// Tuning knobs of [`ShardedStore`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct StoreConfig {
    /// Ring buffer slots. One slot stays empty, so `buffer_capacity - 1` records fit.
    #[builder(default = 2000)]
    pub buffer_capacity: usize,
    /// Maximum records per flushed batch; reaching it also triggers a flush.
    #[builder(default = 1000)]
    pub batch_size: usize,
    /// Period of the flush ticker.
    #[builder(default = Duration::from_millis(50))]
    pub flush_interval: Duration,
    /// Concurrently running flush tasks.
    #[builder(default = default_flush_workers())]
    pub flush_workers: usize,
    /// Flush tasks allowed to wait for a worker before flushing inline.
    #[builder(default = 1000)]
    pub max_pending_flushes: usize,
    /// Batches queued between the batcher and the dispatcher.
    #[builder(default = 10)]
    pub flush_queue: usize,
    /// Deadline for one shard group upsert.
    #[builder(default = Duration::from_secs(5))]
    pub flush_timeout: Duration,
    /// Shared deadline of a fan-out query.
    #[builder(default = Duration::from_secs(10))]
    pub fanout_timeout: Duration,
    /// Rows deleted per round trip of the expiry sweep.
    #[builder(default = 100)]
    pub sweep_chunk: usize,
    /// Pause between sweep chunks of one shard.
    #[builder(default = Duration::from_millis(100))]
    pub sweep_pause: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Totals of one flushed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub written: usize,
    pub duplicates: usize,
    pub conflicts: usize,
    /// Records in shard groups whose upsert failed or timed out.
    pub failed: usize,
}

impl FlushSummary {
    fn absorb(&mut self, outcome: UpsertOutcome) {
        self.written += outcome.written;
        self.duplicates += outcome.duplicates;
        self.conflicts += outcome.conflicts;
    }
}

struct Buffer {
    ring: RingBuffer<UrlRecord>,
    closed: bool,
}

struct Shared<B> {
    backend: Arc<B>,
    buffer: Mutex<Buffer>,
    wake: Notify,
    config: StoreConfig,
}

struct Workers {
    shutdown: watch::Sender<bool>,
    batcher: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// [`LinkStore`] that buffers inserts and flushes them in shard-grouped batches.
///
/// Must be created inside a Tokio runtime. Dropping the store without
/// calling [`ShardedStore::close`] still flushes buffered records, but nobody
/// waits for it.
pub struct ShardedStore<B> {
    shared: Arc<Shared<B>>,
    workers: tokio::sync::Mutex<Option<Workers>>,
}

impl<B: ShardBackend> ShardedStore<B> {
    pub fn new(backend: B, config: StoreConfig) -> Self {
        let shared = Arc::new(Shared {
            backend: Arc::new(backend),
            buffer: Mutex::new(Buffer {
                ring: RingBuffer::new(config.buffer_capacity),
                closed: false,
            }),
            wake: Notify::new(),
            config,
        });

        let (batch_tx, batch_rx) = mpsc::channel(shared.config.flush_queue.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let batcher = tokio::spawn(run_batcher(Arc::clone(&shared), batch_tx, shutdown_rx));
        let dispatcher = tokio::spawn(run_dispatcher(
            Arc::clone(&shared.backend),
            shared.config.clone(),
            batch_rx,
        ));

        info!(
            buffer_capacity = shared.config.buffer_capacity,
            batch_size = shared.config.batch_size,
            flush_workers = shared.config.flush_workers,
            "sharded store started"
        );

        Self {
            shared,
            workers: tokio::sync::Mutex::new(Some(Workers {
                shutdown: shutdown_tx,
                batcher,
                dispatcher,
            })),
        }
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Records buffered and not yet handed to the flush queue.
    pub fn pending(&self) -> usize {
        self.shared.buffer.lock().ring.len()
    }

    /// Queues `record` for the next flush.
    pub fn push(&self, record: UrlRecord) -> Result<()> {
        let pending = {
            let mut buffer = self.shared.buffer.lock();
            if buffer.closed {
                return Err(StorageError::Closed);
            }
            buffer
                .ring
                .push(record)
                .map_err(|_| StorageError::BufferFull)?;
            buffer.ring.len()
        };

        if pending >= self.shared.config.batch_size.max(1) {
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Stops accepting inserts, flushes everything buffered and waits for
    /// every in-flight flush. Later calls return immediately.
    pub async fn shutdown(&self) -> Result<()> {
        self.shared.buffer.lock().closed = true;

        let mut workers = self.workers.lock().await;
        let Some(workers) = workers.take() else {
            return Ok(());
        };

        let _ = workers.shutdown.send(true);
        if let Err(e) = workers.batcher.await {
            error!(error = %e, "flush batcher failed");
        }
        if let Err(e) = workers.dispatcher.await {
            error!(error = %e, "flush dispatcher failed");
        }
        info!("sharded store closed");
        Ok(())
    }
}

async fn run_batcher<B>(
    shared: Arc<Shared<B>>,
    batches: mpsc::Sender<Vec<UrlRecord>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = shared.config.flush_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shared.wake.notified() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
        if !forward_batches(&shared, &batches).await {
            return;
        }
    }

    forward_batches(&shared, &batches).await;
    debug!("flush batcher drained");
}

/// Moves everything buffered into the flush queue. Returns `false` once the
/// dispatcher is gone.
async fn forward_batches<B>(shared: &Shared<B>, batches: &mpsc::Sender<Vec<UrlRecord>>) -> bool {
    let batch_size = shared.config.batch_size.max(1);
    loop {
        let batch = shared.buffer.lock().ring.pop_batch(batch_size);
        if batch.is_empty() {
            return true;
        }
        let records = batch.len();
        if batches.send(batch).await.is_err() {
            error!(records, "flush queue closed, dropping batch");
            return false;
        }
    }
}

async fn run_dispatcher<B: ShardBackend>(
    backend: Arc<B>,
    config: StoreConfig,
    mut batches: mpsc::Receiver<Vec<UrlRecord>>,
) {
    let mut pool = FlushPool::new(config.flush_workers, config.max_pending_flushes);

    while let Some(batch) = batches.recv().await {
        let task = flush_and_log(Arc::clone(&backend), batch, config.flush_timeout);
        if let Err(task) = pool.try_spawn(task) {
            warn!("flush pool saturated, flushing inline");
            task.await;
        }
    }

    pool.drain().await;
    debug!("flush dispatcher stopped");
}

async fn flush_and_log<B: ShardBackend>(backend: Arc<B>, batch: Vec<UrlRecord>, timeout: Duration) {
    let records = batch.len();
    let summary = flush_batch(backend, batch, timeout).await;
    debug!(
        records,
        written = summary.written,
        duplicates = summary.duplicates,
        conflicts = summary.conflicts,
        failed = summary.failed,
        "batch flushed"
    );
}

/// Upserts `batch` grouped by shard, all groups in parallel.
pub(crate) async fn flush_batch<B: ShardBackend>(
    backend: Arc<B>,
    batch: Vec<UrlRecord>,
    timeout: Duration,
) -> FlushSummary {
    let mut groups: BTreeMap<Shard, Vec<UrlRecord>> = BTreeMap::new();
    for record in batch {
        groups.entry(record.code.shard()).or_default().push(record);
    }

    let mut tasks = JoinSet::new();
    for (shard, records) in groups {
        let backend = Arc::clone(&backend);
        tasks.spawn(async move {
            let count = records.len();
            let result = match tokio::time::timeout(timeout, backend.upsert(shard, &records)).await
            {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout(format!(
                    "upsert into shard {shard} exceeded {timeout:?}"
                ))),
            };
            (shard, count, result)
        });
    }

    let mut summary = FlushSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, _, Ok(outcome))) => summary.absorb(outcome),
            Ok((shard, count, Err(e))) => {
                error!(shard = %shard, records = count, error = %e, "failed to flush shard batch");
                summary.failed += count;
            }
            Err(e) => error!(error = %e, "shard flush task failed"),
        }
    }
    summary
}

async fn sweep_shard<B: ShardBackend>(
    backend: &B,
    shard: Shard,
    now: Timestamp,
    chunk: usize,
    pause: Duration,
) -> Result<Vec<ShortCode>> {
    let mut deleted = Vec::new();
    loop {
        let codes = backend.delete_expired_chunk(shard, now, chunk).await?;
        let exhausted = codes.len() < chunk;
        deleted.extend(codes);
        if exhausted {
            return Ok(deleted);
        }
        tokio::time::sleep(pause).await;
    }
}

#[async_trait]
impl<B: ShardBackend> LinkStore for ShardedStore<B> {
    async fn insert(&self, record: UrlRecord) -> Result<()> {
        self.push(record)
    }

    async fn find_by_code(&self, code: &ShortCode, now: Timestamp) -> Result<Option<UrlRecord>> {
        self.shared.backend.find_by_code(code, now).await
    }

    async fn find_by_origin(&self, origin: &str, now: Timestamp) -> Result<Option<UrlRecord>> {
        let backend = &self.shared.backend;
        fanout::race(self.shared.config.fanout_timeout, |shard| {
            let backend = Arc::clone(backend);
            let origin = origin.to_string();
            async move { backend.find_by_origin(shard, &origin, now).await }
        })
        .await
    }

    async fn find_expired(&self, now: Timestamp) -> Result<Vec<UrlRecord>> {
        let backend = &self.shared.backend;
        fanout::gather(self.shared.config.fanout_timeout, |shard| {
            let backend = Arc::clone(backend);
            async move { backend.find_expired(shard, now).await }
        })
        .await
    }

    async fn find_all_valid(&self, now: Timestamp) -> Result<Vec<UrlRecord>> {
        let backend = &self.shared.backend;
        fanout::gather(self.shared.config.fanout_timeout, |shard| {
            let backend = Arc::clone(backend);
            async move { backend.find_valid(shard, now).await }
        })
        .await
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        self.shared.backend.delete(code).await
    }

    async fn delete_expired(&self, now: Timestamp) -> Result<Vec<ShortCode>> {
        let chunk = self.shared.config.sweep_chunk.max(1);
        let pause = self.shared.config.sweep_pause;

        let mut tasks = JoinSet::new();
        for shard in Shard::all() {
            let backend = Arc::clone(&self.shared.backend);
            tasks.spawn(async move { (shard, sweep_shard(&*backend, shard, now, chunk, pause).await) });
        }

        let mut deleted = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(codes))) => deleted.extend(codes),
                Ok((shard, Err(e))) => {
                    warn!(shard = %shard, error = %e, "expired sweep failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error
                        .get_or_insert(StorageError::Operation(format!("sweep task failed: {e}")));
                }
            }
        }

        match first_error {
            Some(e) => {
                warn!(deleted = deleted.len(), "expired sweep incomplete");
                Err(e)
            }
            None => {
                debug!(deleted = deleted.len(), "expired sweep finished");
                Ok(deleted)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.shutdown().await
    }
}
