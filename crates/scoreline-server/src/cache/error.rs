//! Cache error types.

use thiserror::Error;

/// Errors surfaced by the cache tiers.
///
/// `NotFound` is an ordinary miss and callers treat it as such; only
/// `Unavailable` means a tier could not be reached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache key not found: {0}")]
    NotFound(String),

    #[error("cache entry expired: {0}")]
    Expired(String),

    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("invalid cache value: {0}")]
    InvalidValue(String),

    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization failed: {0}")]
    Serialization(String),
}

impl CacheError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// True for plain misses (absent or expired).
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Unavailable(format!("redis pool: {e}"))
    }
}

impl From<rmp_serde::encode::Error> for CacheError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CacheError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::InvalidValue(e.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
