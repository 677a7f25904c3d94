//! Two-tier caching infrastructure.
//!
//! - [`MemoryCache`]: bounded in-process tier (DashMap)
//! - [`RemoteCache`]: shared tier, Redis in production
//! - [`LayeredCache`]: read-through/write-through composition of the two

pub mod error;
pub mod keys;
pub mod layered;
pub mod local;
pub mod pattern;
pub mod redis_cache;
pub mod remote;

pub use error::{CacheError, CacheResult};
pub use layered::{LayeredCache, LayeredCacheConfig, LayeredCacheStats};
pub use local::{CachedEntry, MemoryCache};
pub use redis_cache::{RedisRemoteCache, create_remote_cache};
pub use remote::{InMemoryRemoteCache, RemoteCache, SharedRemoteCache};
