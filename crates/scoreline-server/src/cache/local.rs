//! In-process memory tier.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::pattern::glob_match;

/// Default bound on memory-tier entries.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` so hits hand out a cheap clone instead of
/// copying serialized leaderboards.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Arc<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }

    pub fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.cached_at.elapsed())
    }

    fn expires_at(&self) -> Instant {
        self.cached_at + self.ttl
    }
}

/// Bounded DashMap tier with per-entry expiry.
///
/// Expired entries are dropped lazily on access and in bulk by
/// [`MemoryCache::cleanup_expired`], which the server runs periodically.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, CachedEntry>,
    max_entries: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(Arc::clone(&entry.data));
            }
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired());
        }
        None
    }

    pub fn set(&self, key: &str, data: Arc<Vec<u8>>, ttl: Duration) {
        if ttl.is_zero() {
            self.entries.remove(key);
            return;
        }
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.make_room();
        }
        self.entries
            .insert(key.to_string(), CachedEntry::new(data, ttl));
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key matching a glob pattern (`*` and `?`).
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !glob_match(pattern, key));
        before.saturating_sub(self.entries.len())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    /// Reset the expiry of a live entry. Returns false if it is absent.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.cached_at = Instant::now();
                entry.ttl = ttl;
                true
            }
            _ => false,
        }
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.remaining())
    }

    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Removed expired memory cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    // Drops expired entries first, then the entry closest to expiry.
    fn make_room(&self) {
        if self.cleanup_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().expires_at())
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Arc<Vec<u8>> {
        Arc::new(s.as_bytes().to_vec())
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_set_and_expiry() {
        let cache = MemoryCache::default();
        cache.set("k", bytes("v"), Duration::from_secs(10));
        assert_eq!(cache.get("k"), Some(bytes("v")));
        assert!(cache.exists("k"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_and_ttl() {
        let cache = MemoryCache::default();
        cache.set("k", bytes("v"), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.ttl("k"), Some(Duration::from_secs(6)));

        assert!(cache.expire("k", Duration::from_secs(30)));
        assert_eq!(cache.ttl("k"), Some(Duration::from_secs(30)));
        assert!(!cache.expire("missing", Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let cache = MemoryCache::default();
        cache.set("short", bytes("a"), Duration::from_secs(1));
        cache.set("long", bytes("b"), Duration::from_secs(100));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.exists("long"));
    }

    #[test]
    fn test_delete_pattern() {
        let cache = MemoryCache::default();
        let ttl = Duration::from_secs(60);
        cache.set("leaderboard:GLOBAL", bytes("1"), ttl);
        cache.set("leaderboard:SPRING", bytes("2"), ttl);
        cache.set("user:7", bytes("3"), ttl);

        assert_eq!(cache.delete_pattern("leaderboard:*"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.exists("user:7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_eviction_prefers_soonest_expiry() {
        let cache = MemoryCache::new(2);
        cache.set("a", bytes("a"), Duration::from_secs(5));
        cache.set("b", bytes("b"), Duration::from_secs(50));
        cache.set("c", bytes("c"), Duration::from_secs(50));

        assert_eq!(cache.len(), 2);
        assert!(!cache.exists("a"));
        assert!(cache.exists("b"));
        assert!(cache.exists("c"));
    }

    #[test]
    fn test_zero_ttl_removes() {
        let cache = MemoryCache::default();
        cache.set("k", bytes("v"), Duration::from_secs(5));
        cache.set("k", bytes("v"), Duration::ZERO);
        assert!(!cache.exists("k"));
    }
}
