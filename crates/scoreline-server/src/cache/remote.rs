//! Remote (shared) cache tier.
//!
//! The remote tier is the source of truth for cached values; memory-tier
//! entries are short-lived copies of it. Production uses
//! [`RedisRemoteCache`](super::redis_cache::RedisRemoteCache); single-instance
//! deployments and tests use [`InMemoryRemoteCache`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::error::{CacheError, CacheResult};
use super::pattern::glob_match;

/// Operations the layered cache needs from a shared key/value store.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete one key. Returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Delete every key matching a glob pattern. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Reset a key's expiry. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Remaining lifetime, or `None` if the key is absent.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    async fn ping(&self) -> CacheResult<()>;

    /// Short label for logs and health reports.
    fn backend_name(&self) -> &'static str;
}

pub type SharedRemoteCache = Arc<dyn RemoteCache>;

#[derive(Debug, Clone)]
struct RemoteEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl RemoteEntry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Process-local stand-in for Redis.
///
/// Availability can be toggled to exercise degraded paths.
#[derive(Debug)]
pub struct InMemoryRemoteCache {
    entries: DashMap<String, RemoteEntry>,
    available: AtomicBool,
}

impl Default for InMemoryRemoteCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryRemoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate losing or regaining the connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> CacheResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::unavailable("in-memory remote cache offline"))
        }
    }

    fn live(&self, key: &str) -> Option<RemoteEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_live() {
            return Some(entry.clone());
        }
        drop(entry);
        self.entries.remove_if(key, |_, e| !e.is_live());
        None
    }
}

#[async_trait]
impl RemoteCache for InMemoryRemoteCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.live(key).map(|e| e.data))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.check()?;
        if ttl.is_zero() {
            return Err(CacheError::InvalidValue(format!(
                "zero ttl for key {key}"
            )));
        }
        self.entries.insert(
            key.to_string(),
            RemoteEntry {
                data: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        Ok(self.entries.remove(key).is_some_and(|(_, e)| e.is_live()))
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.check()?;
        let mut removed = 0u64;
        self.entries.retain(|key, entry| {
            if glob_match(pattern, key) {
                if entry.is_live() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.check()?;
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live() => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.check()?;
        Ok(self
            .live(key)
            .map(|e| e.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
