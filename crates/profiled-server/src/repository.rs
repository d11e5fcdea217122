//! Cache-aside user repository.
//!
//! Reads by id go cache first, then the store. Every other operation goes
//! straight to the store. The store is the source of truth; the cache is
//! best effort in both directions:
//!
//! - a cache hit is trusted without consulting the store
//! - a true miss reads the store and writes the snapshot back
//! - a cache failure (transport, timeout, undecodable entry) is logged and
//!   read through to the store without writing back
//! - an update invalidates the cached snapshot after the store write
//!
//! Concurrent misses for the same id share one store read: the first caller
//! loads, later callers wait for it and then re-check the cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use profiled_auth::{NewUser, ProfileUpdate, StoreError, User, UserStorage};

use crate::cache::{CacheError, ProfileCache};

/// Errors surfaced by the repository.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("user not found")]
    NotFound,

    #[error("email already registered")]
    DuplicateEmail,

    /// Any store failure other than the above, including timeouts.
    #[error("unexpected storage failure: {message}")]
    Unexpected { message: String },
}

impl RepositoryError {
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            other => Self::unexpected(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// User repository with a cache-aside read path.
pub struct UserRepository {
    store: Arc<dyn UserStorage>,
    cache: ProfileCache,
    in_flight: DashMap<i64, Arc<Mutex<()>>>,
    cache_timeout: Duration,
    store_timeout: Duration,
}

impl std::fmt::Debug for UserRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRepository")
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight.len())
            .field("cache_timeout", &self.cache_timeout)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl UserRepository {
    pub fn new(
        store: Arc<dyn UserStorage>,
        cache: ProfileCache,
        cache_timeout: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            in_flight: DashMap::new(),
            cache_timeout,
            store_timeout,
        }
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Reads a user by id through the cache.
    ///
    /// Hits and misses return the same projection (see [`ProfileCache::project`]).
    pub async fn find_by_id(&self, id: i64) -> RepositoryResult<User> {
        match self.cache_get(id).await {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    subject_id = id,
                    transport = e.is_transport_error(),
                    error = %e,
                    "Profile cache read failed, reading store"
                );
                return self.load(id).await.map(|u| self.cache.project(u));
            }
        }

        let member = InFlight::join(&self.in_flight, id);
        self.load_coalesced(id, &member.gate).await
    }

    async fn load_coalesced(&self, id: i64, gate: &Mutex<()>) -> RepositoryResult<User> {
        if let Ok(_leader) = gate.try_lock() {
            return self.load_and_populate(id).await;
        }

        let _follower = gate.lock().await;
        match self.cache_get(id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => self.load_and_populate(id).await,
            Err(e) => {
                tracing::warn!(
                    subject_id = id,
                    transport = e.is_transport_error(),
                    error = %e,
                    "Profile cache re-check failed, reading store"
                );
                self.load(id).await.map(|u| self.cache.project(u))
            }
        }
    }

    async fn load_and_populate(&self, id: i64) -> RepositoryResult<User> {
        let user = self.load(id).await?;
        if let Err(e) = self.with_cache_timeout(self.cache.set(&user)).await {
            tracing::warn!(
                subject_id = id,
                transport = e.is_transport_error(),
                error = %e,
                "Failed to populate profile cache"
            );
        }
        Ok(self.cache.project(user))
    }

    async fn load(&self, id: i64) -> RepositoryResult<User> {
        self.with_store_timeout(self.store.find_by_id(id))
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Reads a user by email from the store. Never touches the cache.
    pub async fn find_by_email(&self, email: &str) -> RepositoryResult<User> {
        self.with_store_timeout(self.store.find_by_email(email))
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Inserts a user and returns the assigned id.
    pub async fn create(&self, user: &NewUser) -> RepositoryResult<i64> {
        self.with_store_timeout(self.store.insert(user)).await
    }

    /// Applies a selective profile update, then drops the cached snapshot.
    pub async fn update(&self, update: &ProfileUpdate) -> RepositoryResult<()> {
        self.with_store_timeout(self.store.update_profile(update))
            .await?;
        if let Err(e) = self.with_cache_timeout(self.cache.delete(update.id)).await {
            tracing::warn!(
                subject_id = update.id,
                transport = e.is_transport_error(),
                error = %e,
                "Failed to invalidate profile cache"
            );
        }
        Ok(())
    }

    async fn cache_get(&self, id: i64) -> Result<Option<User>, CacheError> {
        self.with_cache_timeout(self.cache.get(id)).await
    }

    async fn with_cache_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.cache_timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout)?
    }

    async fn with_store_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> RepositoryResult<T> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e @ (StoreError::NotFound | StoreError::DuplicateEmail))) => Err(e.into()),
            Ok(Err(e)) => {
                tracing::error!(transient = e.is_transient(), error = %e, "User store operation failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::error!(transient = true, "User store operation timed out");
                Err(RepositoryError::unexpected("store operation timed out"))
            }
        }
    }
}

/// Membership of one caller in the coalescing map for an id.
///
/// The map entry is removed when the last member leaves, including when the
/// caller's future is dropped mid-read.
struct InFlight<'a> {
    map: &'a DashMap<i64, Arc<Mutex<()>>>,
    id: i64,
    gate: Arc<Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn join(map: &'a DashMap<i64, Arc<Mutex<()>>>, id: i64) -> Self {
        let gate = Arc::clone(map.entry(id).or_default().value());
        Self { map, id, gate }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Release our handle before checking whether anyone else still holds one.
        drop(std::mem::take(&mut self.gate));
        self.map
            .remove_if(&self.id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBackend;
    use crate::storage::InMemoryUserStorage;
    use async_trait::async_trait;
    use profiled_auth::StoreResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store wrapper that counts reads by id and can slow them down.
    struct CountingStore {
        inner: InMemoryUserStorage,
        reads: AtomicUsize,
        delay: Duration,
    }

    impl CountingStore {
        fn new(delay: Duration) -> Self {
            Self {
                inner: InMemoryUserStorage::new(),
                reads: AtomicUsize::new(0),
                delay,
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserStorage for CountingStore {
        async fn insert(&self, user: &NewUser) -> StoreResult<i64> {
            self.inner.insert(user).await
        }
        async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.find_by_id(id).await
        }
        async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
            self.inner.find_by_email(email).await
        }
        async fn update_profile(&self, update: &ProfileUpdate) -> StoreResult<()> {
            self.inner.update_profile(update).await
        }
    }

    /// Store that must never be read by id.
    struct PanickingStore;

    #[async_trait]
    impl UserStorage for PanickingStore {
        async fn insert(&self, _user: &NewUser) -> StoreResult<i64> {
            panic!("unexpected insert")
        }
        async fn find_by_id(&self, _id: i64) -> StoreResult<Option<User>> {
            panic!("store must not be read on a cache hit")
        }
        async fn find_by_email(&self, _email: &str) -> StoreResult<Option<User>> {
            panic!("unexpected find_by_email")
        }
        async fn update_profile(&self, _update: &ProfileUpdate) -> StoreResult<()> {
            panic!("unexpected update")
        }
    }

    /// Store whose reads never complete in time.
    struct HangingStore;

    #[async_trait]
    impl UserStorage for HangingStore {
        async fn insert(&self, _user: &NewUser) -> StoreResult<i64> {
            std::future::pending().await
        }
        async fn find_by_id(&self, _id: i64) -> StoreResult<Option<User>> {
            std::future::pending().await
        }
        async fn find_by_email(&self, _email: &str) -> StoreResult<Option<User>> {
            std::future::pending().await
        }
        async fn update_profile(&self, _update: &ProfileUpdate) -> StoreResult<()> {
            std::future::pending().await
        }
    }

    fn local_cache() -> ProfileCache {
        ProfileCache::new(CacheBackend::new_local(), Duration::from_secs(900))
    }

    fn unreachable_cache() -> ProfileCache {
        let mut cfg = deadpool_redis::Config::from_url("redis://127.0.0.1:1");
        let pool_config = cfg.pool.get_or_insert_with(deadpool_redis::PoolConfig::default);
        pool_config.timeouts.wait = Some(Duration::from_millis(100));
        pool_config.timeouts.create = Some(Duration::from_millis(100));
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        ProfileCache::new(CacheBackend::new_redis(pool), Duration::from_secs(900))
    }

    fn repo(store: Arc<dyn UserStorage>, cache: ProfileCache) -> UserRepository {
        UserRepository::new(store, cache, Duration::from_millis(500), Duration::from_secs(2))
    }

    fn snapshot(id: i64) -> User {
        User {
            id,
            email: format!("u{id}@example.com"),
            password_hash: None,
            name: "Ann".into(),
            birthday: "1990-01-02".into(),
            description: String::new(),
            ctime: 1,
            utime: 1,
        }
    }

    #[tokio::test]
    async fn test_hit_never_reads_store() {
        let cache = local_cache();
        cache.set(&snapshot(7)).await.unwrap();
        let repo = repo(Arc::new(PanickingStore), cache);

        let user = repo.find_by_id(7).await.unwrap();
        assert_eq!(user, snapshot(7));
    }

    #[tokio::test]
    async fn test_miss_reads_store_then_populates() {
        let store = Arc::new(CountingStore::new(Duration::ZERO));
        let id = store
            .insert(&NewUser::new("a@example.com", "$argon2id$hash"))
            .await
            .unwrap();
        let repo = repo(store.clone(), local_cache());

        let first = repo.find_by_id(id).await.unwrap();
        assert_eq!(first.email, "a@example.com");
        assert!(first.password_hash.is_none());
        assert_eq!(store.reads(), 1);

        let cached = repo.cache().get(id).await.unwrap().unwrap();
        assert_eq!(cached, first);

        let second = repo.find_by_id(id).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let store = Arc::new(CountingStore::new(Duration::ZERO));
        let repo = repo(store.clone(), local_cache());

        assert!(matches!(
            repo.find_by_id(99).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            repo.find_by_id(99).await,
            Err(RepositoryError::NotFound)
        ));
        assert_eq!(store.reads(), 2);
        assert!(repo.cache().get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_outage_reads_through_without_populating() {
        let store = Arc::new(CountingStore::new(Duration::ZERO));
        let id = store
            .insert(&NewUser::new("a@example.com", "$argon2id$hash"))
            .await
            .unwrap();
        let repo = repo(store.clone(), unreachable_cache());

        let user = repo.find_by_id(id).await.unwrap();
        assert_eq!(user.email, "a@example.com");
        assert!(user.password_hash.is_none());

        repo.find_by_id(id).await.unwrap();
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_through_without_populating() {
        let backend = CacheBackend::new_local();
        let store = Arc::new(CountingStore::new(Duration::ZERO));
        let id = store
            .insert(&NewUser::new("a@example.com", "h"))
            .await
            .unwrap();
        backend
            .set(&crate::cache::profile_key(id), b"{".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let repo = repo(
            store.clone(),
            ProfileCache::new(backend.clone(), Duration::from_secs(900)),
        );

        let user = repo.find_by_id(id).await.unwrap();
        assert_eq!(user.id, id);
        let raw = backend
            .get(&crate::cache::profile_key(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw.as_slice(), b"{");
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_store_read() {
        let store = Arc::new(CountingStore::new(Duration::from_millis(100)));
        let id = store
            .insert(&NewUser::new("a@example.com", "h"))
            .await
            .unwrap();
        let repo = Arc::new(repo(store.clone(), local_cache()));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let repo = Arc::clone(&repo);
            tasks.spawn(async move { repo.find_by_id(id).await });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().unwrap().id, id);
        }

        assert_eq!(store.reads(), 1);
        assert!(repo.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_reads_leave_no_in_flight_entries() {
        let store = Arc::new(CountingStore::new(Duration::from_millis(200)));
        let repo = repo(store.clone(), local_cache());

        for id in 0..100 {
            let read = tokio::time::timeout(Duration::from_millis(2), repo.find_by_id(id)).await;
            assert!(read.is_err());
        }

        assert_eq!(store.reads(), 100);
        assert!(repo.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_follower_completes_after_leader_is_cancelled() {
        let store = Arc::new(CountingStore::new(Duration::from_millis(100)));
        let id = store
            .insert(&NewUser::new("a@example.com", "h"))
            .await
            .unwrap();
        let repo = Arc::new(repo(store.clone(), local_cache()));

        let follower = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                repo.find_by_id(id).await
            })
        };
        let leader = tokio::time::timeout(Duration::from_millis(30), repo.find_by_id(id)).await;
        assert!(leader.is_err());

        assert_eq!(follower.await.unwrap().unwrap().id, id);
        assert_eq!(store.reads(), 2);
        assert!(repo.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_update_invalidates_snapshot() {
        let store = Arc::new(CountingStore::new(Duration::ZERO));
        let id = store
            .insert(&NewUser::new("a@example.com", "h"))
            .await
            .unwrap();
        let repo = repo(store.clone(), local_cache());

        repo.find_by_id(id).await.unwrap();
        repo.update(&ProfileUpdate {
            id,
            name: "Bob".into(),
            birthday: "2000-01-01".into(),
            description: "new".into(),
        })
        .await
        .unwrap();

        assert!(repo.cache().get(id).await.unwrap().is_none());
        let user = repo.find_by_id(id).await.unwrap();
        assert_eq!(user.name, "Bob");
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let repo = repo(Arc::new(InMemoryUserStorage::new()), local_cache());
        let err = repo
            .update(&ProfileUpdate {
                id: 5,
                ..ProfileUpdate::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_create_duplicate_email() {
        let repo = repo(Arc::new(InMemoryUserStorage::new()), local_cache());
        let id = repo.create(&NewUser::new("a@example.com", "h")).await.unwrap();
        assert!(id > 0);
        assert!(matches!(
            repo.create(&NewUser::new("a@example.com", "h")).await,
            Err(RepositoryError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn test_find_by_email_skips_cache() {
        let store = Arc::new(InMemoryUserStorage::new());
        store
            .insert(&NewUser::new("a@example.com", "$argon2id$hash"))
            .await
            .unwrap();
        let repo = repo(store, local_cache());

        let user = repo.find_by_email("a@example.com").await.unwrap();
        assert_eq!(user.password_hash.as_deref(), Some("$argon2id$hash"));
        assert!(repo.cache().get(user.id).await.unwrap().is_none());
        assert!(matches!(
            repo.find_by_email("b@example.com").await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_store_timeout_is_unexpected() {
        let repo = UserRepository::new(
            Arc::new(HangingStore),
            local_cache(),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        assert!(matches!(
            repo.find_by_id(1).await,
            Err(RepositoryError::Unexpected { .. })
        ));
        assert!(repo.in_flight.is_empty());
    }
}
