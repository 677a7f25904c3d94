//! Two-tier cache: memory tier in front of the remote tier.
//!
//! ## Lookup Order
//!
//! 1. Memory tier (DashMap), microsecond latency
//! 2. Remote tier (Redis), millisecond latency
//! 3. Miss
//!
//! A remote hit is copied back into the memory tier in the background with a
//! short TTL that never outlives the remote entry. Writes and deletes go to
//! both tiers, so after a delete returns no tier serves the old value.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::error::{CacheError, CacheResult};
use super::local::MemoryCache;
use super::remote::SharedRemoteCache;
use crate::metrics;

/// Default ceiling on memory-tier TTLs.
pub const DEFAULT_MEMORY_TTL_CEILING: Duration = Duration::from_secs(60);

/// Default TTL for entries copied back from the remote tier.
pub const DEFAULT_REPOPULATE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct LayeredCacheConfig {
    pub memory_ttl_ceiling: Duration,
    pub repopulate_ttl: Duration,
}

impl Default for LayeredCacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_ceiling: DEFAULT_MEMORY_TTL_CEILING,
            repopulate_ttl: DEFAULT_REPOPULATE_TTL,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    remote_hits: AtomicU64,
    remote_misses: AtomicU64,
}

/// Point-in-time counters for the layered cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LayeredCacheStats {
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub remote_hits: u64,
    pub remote_misses: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    /// Percentage in `[0, 100]`.
    pub hit_rate: f64,
    pub memory_entries: usize,
}

pub struct LayeredCache {
    memory: Arc<MemoryCache>,
    remote: SharedRemoteCache,
    config: LayeredCacheConfig,
    counters: Counters,
    // bumped by every delete; stale copy-backs compare against it
    epoch: Arc<AtomicU64>,
}

impl LayeredCache {
    pub fn new(memory: Arc<MemoryCache>, remote: SharedRemoteCache) -> Self {
        Self::with_config(memory, remote, LayeredCacheConfig::default())
    }

    pub fn with_config(
        memory: Arc<MemoryCache>,
        remote: SharedRemoteCache,
        config: LayeredCacheConfig,
    ) -> Self {
        Self {
            memory,
            remote,
            config,
            counters: Counters::default(),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryCache> {
        &self.memory
    }

    pub fn remote(&self) -> &SharedRemoteCache {
        &self.remote
    }

    /// Look a key up in the memory tier, then the remote tier.
    ///
    /// Returns `NotFound` on a miss in both tiers and `Unavailable` when the
    /// remote tier cannot be reached.
    pub async fn get(&self, key: &str) -> CacheResult<Arc<Vec<u8>>> {
        if let Some(data) = self.memory.get(key) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_hit("memory");
            tracing::debug!(key = %key, "cache hit (memory)");
            return Ok(data);
        }
        self.counters.memory_misses.fetch_add(1, Ordering::Relaxed);

        let epoch = self.epoch.load(Ordering::SeqCst);
        match self.remote.get(key).await {
            Ok(Some(data)) => {
                self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_hit("remote");
                tracing::debug!(key = %key, "cache hit (remote)");

                let data = Arc::new(data);
                self.spawn_copy_back(key, Arc::clone(&data), epoch);
                Ok(data)
            }
            Ok(None) => {
                self.counters.remote_misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_miss();
                tracing::debug!(key = %key, "cache miss");
                Err(CacheError::not_found(key))
            }
            Err(e) => {
                self.counters.remote_misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_miss();
                tracing::warn!(key = %key, error = %e, "Remote cache GET error");
                Err(e)
            }
        }
    }

    // The copy-back asks the remote tier for its remaining TTL so the memory
    // entry never outlives the remote one, and drops out if a delete ran
    // since the value was read.
    fn spawn_copy_back(&self, key: &str, data: Arc<Vec<u8>>, epoch: u64) {
        let memory = Arc::clone(&self.memory);
        let remote = Arc::clone(&self.remote);
        let current = Arc::clone(&self.epoch);
        let ceiling = self.config.repopulate_ttl;
        let key = key.to_string();

        tokio::spawn(async move {
            let ttl = match remote.ttl(&key).await {
                Ok(Some(remaining)) => remaining.min(ceiling),
                Ok(None) => return,
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Skipping memory copy-back");
                    return;
                }
            };
            if current.load(Ordering::SeqCst) != epoch {
                return;
            }
            memory.set(&key, data, ttl);
        });
    }

    /// Write through both tiers. The remote write must succeed before the
    /// memory tier is touched.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty key".to_string()));
        }
        self.remote.set(key, &value, ttl).await?;
        self.memory
            .set(key, Arc::new(value), ttl.min(self.config.memory_ttl_ceiling));
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (memory+remote)");
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.memory.delete(key);
        self.remote.delete(key).await?;
        tracing::debug!(key = %key, "cache invalidated");
        Ok(())
    }

    /// Delete every key matching a glob pattern from both tiers.
    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let local = self.memory.delete_pattern(pattern);
        let remote = self.remote.delete_pattern(pattern).await?;
        tracing::debug!(pattern = %pattern, local, remote, "cache pattern invalidated");
        Ok(remote.max(local as u64))
    }

    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        if self.memory.exists(key) {
            return Ok(true);
        }
        self.remote.exists(key).await
    }

    /// Reset a key's TTL in both tiers, keeping the memory ceiling.
    pub async fn set_ttl(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.memory
            .expire(key, ttl.min(self.config.memory_ttl_ceiling));
        self.remote.expire(key, ttl).await
    }

    /// Remaining lifetime as seen by the remote tier.
    pub async fn get_ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.remote.ttl(key).await
    }

    pub fn get_from_memory(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.memory.get(key)
    }

    pub async fn get_from_remote(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.remote.get(key).await
    }

    pub fn set_to_memory(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.memory
            .set(key, Arc::new(value), ttl.min(self.config.memory_ttl_ceiling));
    }

    pub async fn set_to_remote(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.remote.set(key, value, ttl).await
    }

    /// Drop memory-tier entries matching `pattern`; the remote tier is kept.
    pub fn invalidate_memory(&self, pattern: &str) -> usize {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.memory.delete_pattern(pattern)
    }

    pub async fn ping(&self) -> CacheResult<()> {
        self.remote.ping().await
    }

    /// Changes whenever anything is deleted. Fills computed from a read taken
    /// under an older generation should be dropped.
    pub fn generation(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Typed helpers (MessagePack)
    // =========================================================================

    pub async fn get_decoded<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        let bytes = self.get(key).await?;
        let value = rmp_serde::from_slice(&bytes)?;
        Ok(value)
    }

    pub async fn set_encoded<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let bytes = rmp_serde::to_vec_named(value)?;
        self.set(key, bytes, ttl).await
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub fn stats(&self) -> LayeredCacheStats {
        let memory_hits = self.counters.memory_hits.load(Ordering::Relaxed);
        let memory_misses = self.counters.memory_misses.load(Ordering::Relaxed);
        let remote_hits = self.counters.remote_hits.load(Ordering::Relaxed);
        let remote_misses = self.counters.remote_misses.load(Ordering::Relaxed);

        let total_hits = memory_hits + remote_hits;
        let total_misses = remote_misses;
        let total = total_hits + total_misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            total_hits as f64 / total as f64 * 100.0
        };

        LayeredCacheStats {
            memory_hits,
            memory_misses,
            remote_hits,
            remote_misses,
            total_hits,
            total_misses,
            hit_rate,
            memory_entries: self.memory.len(),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.memory_hits.store(0, Ordering::Relaxed);
        self.counters.memory_misses.store(0, Ordering::Relaxed);
        self.counters.remote_hits.store(0, Ordering::Relaxed);
        self.counters.remote_misses.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for LayeredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredCache")
            .field("remote", &self.remote.backend_name())
            .field("memory_entries", &self.memory.len())
            .field("config", &self.config)
            .finish()
    }
}
