//! Redis-backed remote tier.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use super::error::{CacheError, CacheResult};
use super::remote::{InMemoryRemoteCache, RemoteCache, SharedRemoteCache};
use crate::config::RedisConfig;

/// Remote tier backed by a deadpool-managed Redis connection pool.
#[derive(Clone)]
pub struct RedisRemoteCache {
    pool: Pool,
}

impl RedisRemoteCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> CacheResult<deadpool_redis::Connection> {
        self.pool.get().await.map_err(CacheError::from)
    }
}

impl std::fmt::Debug for RedisRemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisRemoteCache")
            .field("pool_size", &status.size)
            .field("pool_available", &status.available)
            .finish()
    }
}

// Redis expiries are whole seconds; never round a live TTL down to zero.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

#[async_trait]
impl RemoteCache for RedisRemoteCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await?;
        tracing::debug!(key = %key, ttl_secs = ttl_secs(ttl), "Redis SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).await?;
        tracing::debug!(pattern = %pattern, removed, "Redis pattern delete");
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        let updated: bool = conn.expire(key, secs).await?;
        Ok(updated)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.conn().await?;
        let secs: i64 = conn.ttl(key).await?;
        // -2: missing key, -1: key without expiry
        Ok(match secs {
            -2 => None,
            s if s < 0 => Some(Duration::MAX),
            s => Some(Duration::from_secs(s as u64)),
        })
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Build the remote tier from configuration.
///
/// Falls back to [`InMemoryRemoteCache`] when Redis is disabled or cannot be
/// reached at startup, so a single instance still runs without Redis.
pub async fn create_remote_cache(config: &RedisConfig) -> SharedRemoteCache {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process remote cache");
        return Arc::new(InMemoryRemoteCache::new());
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Duration::from_millis(config.timeout_ms);
    if let Some(ref mut pool_config) = redis_config.pool {
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
    } else {
        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        redis_config.pool = Some(pool_config);
    }

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-process cache."
            );
            return Arc::new(InMemoryRemoteCache::new());
        }
    };

    let cache = RedisRemoteCache::new(pool);
    match cache.ping().await {
        Ok(()) => {
            tracing::info!("Connected to Redis successfully");
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process cache."
            );
            Arc::new(InMemoryRemoteCache::new())
        }
    }
}
