pub mod cache;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod repository;
pub mod server;
pub mod service;
pub mod storage;

pub use cache::{CacheBackend, CacheError, ProfileCache};
pub use config::{
    AppConfig, CacheConfig, LoggingConfig, PostgresStorageConfig, RedisConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
pub use observability::init_tracing;
pub use repository::{RepositoryError, UserRepository};
pub use server::{AppState, ProfiledServer, ServerBuilder, build_app};
pub use service::{ServiceError, UserService};
pub use storage::{DynUserStorage, InMemoryUserStorage, create_user_storage};

/// Create a cache backend based on configuration.
///
/// With Redis disabled this is a process-local cache bounded by
/// `cache.local_max_entries`. With Redis enabled the pool is created and
/// pinged once; if either step fails the server keeps running on the local
/// cache.
pub async fn create_cache_backend(config: &RedisConfig, cache: &CacheConfig) -> CacheBackend {
    use std::time::Duration;

    let local = || CacheBackend::new_local_with_capacity(cache.local_max_entries);

    if !config.enabled {
        tracing::info!(
            max_entries = cache.local_max_entries,
            "Redis disabled, using local cache only"
        );
        return local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(deadpool_redis::PoolConfig::default);
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return local();
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            CacheBackend::new_redis(pool)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_redis_uses_local_cache() {
        let backend =
            create_cache_backend(&RedisConfig::default(), &CacheConfig::default()).await;
        assert_eq!(backend.stats().await.mode, "local");
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_local() {
        let cfg = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".into(),
            pool_size: 1,
            timeout_ms: 200,
        };
        let backend = create_cache_backend(&cfg, &CacheConfig::default()).await;
        assert_eq!(backend.stats().await.mode, "local");
    }
}
