//! User profile snapshots in the cache.
//!
//! Entries are JSON snapshots of a [`User`] under `user:info:<id>`. The TTL
//! is fixed when the cache is built and is unrelated to token lifetime.

use std::time::Duration;

use profiled_auth::User;

use super::backend::{CacheBackend, CacheError};

/// Key prefix for profile snapshots.
pub const PROFILE_KEY_PREFIX: &str = "user:info:";

/// Cache key for a user id.
pub fn profile_key(id: i64) -> String {
    format!("{PROFILE_KEY_PREFIX}{id}")
}

/// Typed profile cache over a [`CacheBackend`].
#[derive(Debug, Clone)]
pub struct ProfileCache {
    backend: CacheBackend,
    ttl: Duration,
    include_password_hash: bool,
}

impl ProfileCache {
    pub fn new(backend: CacheBackend, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            include_password_hash: false,
        }
    }

    /// Keep password hashes in snapshots.
    #[must_use]
    pub fn with_password_hash(mut self, include: bool) -> Self {
        self.include_password_hash = include;
        self
    }

    /// The shape a user has once it has gone through this cache.
    pub fn project(&self, user: User) -> User {
        if self.include_password_hash {
            user
        } else {
            User {
                password_hash: None,
                ..user
            }
        }
    }

    /// Reads a snapshot. An undecodable entry is an error, not a miss.
    pub async fn get(&self, id: i64) -> Result<Option<User>, CacheError> {
        let Some(data) = self.backend.get(&profile_key(id)).await? else {
            return Ok(None);
        };
        let user: User = serde_json::from_slice(&data)?;
        Ok(Some(self.project(user)))
    }

    /// Writes a snapshot of `user`.
    pub async fn set(&self, user: &User) -> Result<(), CacheError> {
        let data = serde_json::to_vec(&self.project(user.clone()))?;
        self.backend.set(&profile_key(user.id), data, self.ttl).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), CacheError> {
        self.backend.delete(&profile_key(id)).await
    }
}
