//! User store selection and the in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use profiled_auth::storage::now_millis;
use profiled_auth::{NewUser, ProfileUpdate, StoreError, StoreResult, User, UserStorage};
use profiled_auth_postgres::{PostgresUserStorage, connect, ensure_schema};

use crate::config::{StorageBackend, StorageConfig};

/// Type alias for a shareable user store.
pub type DynUserStorage = Arc<dyn UserStorage>;

/// Creates the configured user store.
///
/// For PostgreSQL this opens the pool and creates the `users` table if needed.
pub async fn create_user_storage(config: &StorageConfig) -> anyhow::Result<DynUserStorage> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory user store; data is lost on restart");
            Ok(Arc::new(InMemoryUserStorage::new()))
        }
        StorageBackend::Postgres => {
            let pg = &config.postgres;
            let pool = connect(&pg.url, pg.pool_size, pg.connect_timeout()).await?;
            ensure_schema(&pool).await?;
            tracing::info!(pool_size = pg.pool_size, "Connected to PostgreSQL");
            Ok(Arc::new(PostgresUserStorage::new(Arc::new(pool))))
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    users: HashMap<i64, User>,
    by_email: HashMap<String, i64>,
}

/// Process-local user store.
#[derive(Debug, Default)]
pub struct InMemoryUserStorage {
    tables: RwLock<Tables>,
}

impl InMemoryUserStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn insert(&self, user: &NewUser) -> StoreResult<i64> {
        let mut tables = self.tables.write().await;
        if tables.by_email.contains_key(&user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        tables.next_id += 1;
        let id = tables.next_id;
        let now = now_millis();
        tables.by_email.insert(user.email.clone(), id);
        tables.users.insert(
            id,
            User {
                id,
                email: user.email.clone(),
                password_hash: Some(user.password_hash.clone()),
                name: String::new(),
                birthday: String::new(),
                description: String::new(),
                ctime: now,
                utime: now,
            },
        );
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&update.id).ok_or(StoreError::NotFound)?;
        user.name.clone_from(&update.name);
        user.birthday.clone_from(&update.birthday);
        user.description.clone_from(&update.description);
        user.utime = now_millis().max(user.utime);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = InMemoryUserStorage::new();
        let a = store.insert(&NewUser::new("a@example.com", "h")).await.unwrap();
        let b = store.insert(&NewUser::new("b@example.com", "h")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = InMemoryUserStorage::new();
        store.insert(&NewUser::new("a@example.com", "h")).await.unwrap();
        let err = store
            .insert(&NewUser::new("a@example.com", "h2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_and_update() {
        let store = InMemoryUserStorage::new();
        let id = store.insert(&NewUser::new("a@example.com", "h")).await.unwrap();
        let before = store.find_by_email("a@example.com").await.unwrap().unwrap();

        store
            .update_profile(&ProfileUpdate {
                id,
                name: "Ann".into(),
                birthday: "1990-01-02".into(),
                description: "hi".into(),
            })
            .await
            .unwrap();

        let after = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(after.name, "Ann");
        assert_eq!(after.email, before.email);
        assert_eq!(after.password_hash, before.password_hash);
        assert_eq!(after.ctime, before.ctime);
        assert!(after.utime >= before.utime);
    }

    #[tokio::test]
    async fn test_update_advances_utime_past_ctime() {
        let store = InMemoryUserStorage::new();
        let id = store.insert(&NewUser::new("a@example.com", "h")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        store
            .update_profile(&ProfileUpdate {
                id,
                name: "Ann".into(),
                birthday: "1990-01-02".into(),
                description: "".into(),
            })
            .await
            .unwrap();

        let after = store.find_by_id(id).await.unwrap().unwrap();
        assert!(after.utime > after.ctime);
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = InMemoryUserStorage::new();
        let err = store
            .update_profile(&ProfileUpdate {
                id: 9,
                ..ProfileUpdate::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
