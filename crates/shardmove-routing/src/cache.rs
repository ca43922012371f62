//! Pending routing cache
//!
//! Pending (migrating) routing rules live only in a fast shared cache. The
//! assignor writes them with set-if-absent so that two concurrent triggers for
//! one project cannot pick different shards; the cutover reads and evicts them.

use crate::error::RoutingError;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

/// Shared cache seam (`SETNX` / `GET` / `DEL` semantics)
#[async_trait]
pub trait RoutingCache: Send + Sync {
    /// Store `value` only if `key` is vacant; `true` when this call stored it
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, RoutingError>;

    /// Current value
    async fn get(&self, key: &str) -> Result<Option<String>, RoutingError>;

    /// Remove the key; `true` when something was removed
    async fn delete(&self, key: &str) -> Result<bool, RoutingError>;
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// In-process routing cache backed by moka
///
/// Entries expire after a TTL so a run that died without cutover cannot pin
/// a project to a pending rule forever.
#[derive(Debug, Clone)]
pub struct MokaRoutingCache {
    inner: Cache<String, String>,
}

impl MokaRoutingCache {
    /// Create cache with max capacity and no expiry
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Get cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

impl Default for MokaRoutingCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl RoutingCache for MokaRoutingCache {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, RoutingError> {
        let entry = self
            .inner
            .entry(key.to_string())
            .or_insert(value.to_string())
            .await;
        Ok(entry.is_fresh())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RoutingError> {
        Ok(self.inner.get(key).await)
    }

    async fn delete(&self, key: &str) -> Result<bool, RoutingError> {
        Ok(self.inner.remove(key).await.is_some())
    }
}
