mod cli;

use crate::cli::{LogFormatArg, CLI};
use clap::Parser;
use linkvault_cache::{
    FilterConfig, FilterManager, LocalCache, LocalCacheConfig, RedisBitStore, RedisUrlCache,
};
use linkvault_resolver::{JobConfig, LinkService, MaintenanceJob, ServiceConfig};
use linkvault_storage::{MySqlShardBackend, ShardedStore, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormatArg::Text => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;
    init_tracing(config.log_format);

    info!(
        redis_url = %config.redis_url,
        filter_key = %config.filter_key,
        interval_secs = config.interval_secs,
        once = config.once,
        "starting linkvault maintenance"
    );

    let backend = MySqlShardBackend::connect(&config.mysql_dsn).await?;
    if config.migrate {
        backend.migrate().await?;
    }

    let client = redis::Client::open(config.redis_url.as_str())?;
    let conn = client.get_multiplexed_async_connection().await?;
    let filter = FilterManager::new(
        RedisBitStore::new(conn.clone()),
        FilterConfig::builder()
            .key(config.filter_key)
            .bits(config.filter_bits)
            .hashes(config.filter_hashes)
            .build(),
    )?;

    let service = Arc::new(LinkService::new(
        LocalCache::new(LocalCacheConfig::default()),
        RedisUrlCache::new(conn),
        filter,
        ShardedStore::new(backend, StoreConfig::default()),
        ServiceConfig::default(),
    ));
    let job = MaintenanceJob::new(
        Arc::clone(&service),
        JobConfig::builder()
            .interval(Duration::from_secs(config.interval_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build(),
    );

    if config.once {
        let report = job.run_once().await?;
        info!(
            expired = report.expired.len(),
            indexed = report.indexed,
            "maintenance pass finished"
        );
    } else {
        job.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await;
    }

    service.close().await?;
    info!("linkvault maintenance stopped");
    Ok(())
}
