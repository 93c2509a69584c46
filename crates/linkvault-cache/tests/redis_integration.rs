use std::time::Duration;

use linkvault_cache::{
    BloomFilter, ExistenceFilter, FilterConfig, FilterManager, RedisBitStore, RedisUrlCache,
    UrlCache,
};
use linkvault_core::ShortCode;
use linkvault_test_infra::redis::RedisServer;
use redis::AsyncCommands;

struct Fixture {
    _redis: RedisServer,
    conn: redis::aio::MultiplexedConnection,
}

impl Fixture {
    async fn start() -> Self {
        let redis = RedisServer::new().await.expect("start redis");
        let conn = redis.connection().await.expect("redis connection");
        Self {
            _redis: redis,
            conn,
        }
    }
}

fn code(value: &str) -> ShortCode {
    ShortCode::new(value).unwrap()
}

#[tokio::test]
async fn url_cache_round_trip_and_delete() {
    let fixture = Fixture::start().await;
    let cache = RedisUrlCache::new(fixture.conn.clone());
    let c = code("a1B2c3D");

    assert!(cache.get_url(&c).await.unwrap().is_none());

    cache.set_url(&c, "https://example.com").await.unwrap();
    assert_eq!(
        cache.get_url(&c).await.unwrap().as_deref(),
        Some("https://example.com")
    );

    cache.del(&c).await.unwrap();
    assert!(cache.get_url(&c).await.unwrap().is_none());
}

#[tokio::test]
async fn url_cache_sets_and_refreshes_ttl() {
    let fixture = Fixture::start().await;
    let cache = RedisUrlCache::with_prefix(fixture.conn.clone(), "test:url:")
        .with_ttl(Duration::from_secs(100));
    let c = code("a1B2c3D");

    cache.set_url(&c, "https://example.com").await.unwrap();

    let mut conn = fixture.conn.clone();
    let _: () = redis::cmd("EXPIRE")
        .arg("test:url:a1B2c3D")
        .arg(5)
        .query_async(&mut conn)
        .await
        .unwrap();

    cache.refresh(&c).await.unwrap();

    let ttl: i64 = conn.ttl("test:url:a1B2c3D").await.unwrap();
    assert!(ttl > 5 && ttl <= 100, "unexpected ttl {ttl}");

    // Refreshing a missing key is a no-op.
    cache.refresh(&code("missing")).await.unwrap();
}

#[tokio::test]
async fn bloom_scripts_set_and_check_atomically() {
    let fixture = Fixture::start().await;
    let filter = BloomFilter::new(RedisBitStore::new(fixture.conn.clone()), 1_000_000, 7).unwrap();

    assert!(!filter.exist("bloom", "a1B2c3D").await.unwrap());
    filter.set("bloom", "a1B2c3D").await.unwrap();
    assert!(filter.exist("bloom", "a1B2c3D").await.unwrap());

    let stats = filter.stats("bloom").await.unwrap();
    assert!(stats.set_bits > 0 && stats.set_bits <= 7);
}

#[tokio::test]
async fn rebuild_swaps_in_pipelined_contents() {
    let fixture = Fixture::start().await;
    let config = FilterConfig::builder().key("test:bloom").build();
    let manager = FilterManager::new(RedisBitStore::new(fixture.conn.clone()), config).unwrap();

    let codes: Vec<ShortCode> = (0..2_500).map(|i| code(&format!("r{i:06}"))).collect();
    manager.rebuild(&codes).await.unwrap();

    for c in codes.iter().step_by(50) {
        assert!(manager.exist(c).await.unwrap());
    }
    assert!(manager.is_initialized().await.unwrap());

    let mut conn = fixture.conn.clone();
    let temp_exists: bool = conn.exists("test:bloom_temp").await.unwrap();
    assert!(!temp_exists);
}
