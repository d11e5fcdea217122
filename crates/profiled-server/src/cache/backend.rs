//! Cache backend: a bounded local moka cache or a shared Redis instance.

use deadpool_redis::Pool;
use moka::Expiry;
use moka::future::Cache;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on the number of locally cached entries.
pub const DEFAULT_LOCAL_CAPACITY: u64 = 10_000;

/// Failure talking to the cache.
///
/// Distinct from a miss: a get that reaches the cache and finds nothing is
/// `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No connection could be taken from the Redis pool.
    #[error("cache connection failed: {0}")]
    Connection(#[from] deadpool_redis::PoolError),

    /// Redis returned an error.
    #[error("cache command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// A cached value could not be encoded or decoded.
    #[error("cache entry codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The operation did not finish in time.
    #[error("cache operation timed out")]
    Timeout,
}

impl CacheError {
    /// Returns `true` if the cache itself could not be reached.
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Command(_) | Self::Timeout)
    }
}

/// A locally cached value and the TTL it was stored with.
///
/// The data is wrapped in `Arc` to allow cheap cloning on cache hits.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            ttl,
        }
    }
}

/// Per-entry expiry: every write restarts the entry's own TTL.
struct EntryTtl;

impl Expiry<String, CachedEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache backend.
///
/// ## Cache Modes
///
/// - **Local**: Single-instance mode using a bounded moka cache with per-entry
///   TTL; expired entries are evicted by moka's housekeeping
/// - **Redis**: Multi-instance mode; entries live only in Redis (`SET EX` /
///   `GET` / `DEL`) so an invalidation is seen by every instance
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local moka cache only
    Local(Cache<String, CachedEntry>),

    /// Multi-instance: shared Redis
    Redis(Pool),
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Local(cache) => f
                .debug_tuple("Local")
                .field(&cache.entry_count())
                .finish(),
            CacheBackend::Redis(_) => f.write_str("Redis"),
        }
    }
}

impl CacheBackend {
    /// Create a local-only cache backend with the default capacity.
    pub fn new_local() -> Self {
        Self::new_local_with_capacity(DEFAULT_LOCAL_CAPACITY)
    }

    /// Create a local-only cache backend holding at most `capacity` entries.
    pub fn new_local_with_capacity(capacity: u64) -> Self {
        CacheBackend::Local(
            Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryTtl)
                .build(),
        )
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis(redis_pool)
    }

    /// Get a value from the cache.
    ///
    /// Returns `Ok(None)` on a miss (including an expired local entry).
    pub async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(cache) => Ok(cache.get(key).await.map(|entry| entry.data)),
            CacheBackend::Redis(redis) => {
                let mut conn = redis.get().await?;
                let data: Option<Vec<u8>> = conn.get(key).await?;
                Ok(data.map(Arc::new))
            }
        }
    }

    /// Set a value in the cache with TTL.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(cache) => {
                cache
                    .insert(key.to_string(), CachedEntry::new(value, ttl))
                    .await;
                Ok(())
            }
            CacheBackend::Redis(redis) => {
                let mut conn = redis.get().await?;
                let ttl_secs = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
                tracing::debug!(key = %key, ttl_secs = %ttl_secs, "cache set");
                Ok(())
            }
        }
    }

    /// Remove a cache entry. Removing a missing key is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(cache) => {
                cache.invalidate(key).await;
                tracing::debug!(key = %key, "cache invalidated (local)");
                Ok(())
            }
            CacheBackend::Redis(redis) => {
                let mut conn = redis.get().await?;
                conn.del::<_, ()>(key).await?;
                tracing::debug!(key = %key, "cache invalidated (redis)");
                Ok(())
            }
        }
    }

    /// Get cache statistics.
    ///
    /// For the local cache, pending evictions are applied first so the count
    /// excludes expired entries.
    pub async fn stats(&self) -> CacheStats {
        match self {
            CacheBackend::Local(cache) => {
                cache.run_pending_tasks().await;
                CacheStats {
                    local_entries: cache.entry_count(),
                    mode: "local",
                }
            }
            CacheBackend::Redis(_) => CacheStats {
                local_entries: 0,
                mode: "redis",
            },
        }
    }

    /// Check if Redis is available (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis(redis) => redis.get().await.is_ok(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub local_entries: u64,
    pub mode: &'static str,
}
