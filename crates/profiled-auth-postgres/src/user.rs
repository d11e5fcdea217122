//! User storage.
//!
//! Email is unique; `ctime` and `utime` are epoch milliseconds set here,
//! never by the caller.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use profiled_auth::storage::now_millis;
use profiled_auth::{NewUser, ProfileUpdate, StoreResult, User, UserStorage};

use crate::{PgPool, StorageError, StorageResult};

// =============================================================================
// Types
// =============================================================================

type UserTuple = (i64, String, String, String, String, String, i64, i64);

/// User row from the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub birthday: String,
    pub description: String,
    pub ctime: i64,
    pub utime: i64,
}

impl UserRow {
    fn from_tuple(row: UserTuple) -> Self {
        Self {
            id: row.0,
            email: row.1,
            password_hash: row.2,
            name: row.3,
            birthday: row.4,
            description: row.5,
            ctime: row.6,
            utime: row.7,
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: Some(row.password_hash),
            name: row.name,
            birthday: row.birthday,
            description: row.description,
            ctime: row.ctime,
            utime: row.utime,
        }
    }
}

// =============================================================================
// User Storage
// =============================================================================

/// PostgreSQL user storage.
///
/// Owns an `Arc` of the pool so it can be shared as `Arc<dyn UserStorage>`.
#[derive(Debug, Clone)]
pub struct PostgresUserStorage {
    pool: Arc<PgPool>,
}

impl PostgresUserStorage {
    /// Create a new user storage over a connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new user and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the email is already registered.
    pub async fn insert_row(&self, user: &NewUser) -> StorageResult<i64> {
        let now = now_millis();
        let (id,): (i64,) = query_as(
            r#"
            INSERT INTO users (email, password_hash, ctime, utime)
            VALUES ($1, $2, $3, $3)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| {
            if let sqlx_core::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StorageError::conflict(format!("email '{}' already registered", user.email));
            }
            StorageError::from(e)
        })?;

        Ok(id)
    }

    /// Find a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_row_by_id(&self, id: i64) -> StorageResult<Option<UserRow>> {
        let row: Option<UserTuple> = query_as(
            r#"
            SELECT id, email, password_hash, name, birthday, description, ctime, utime
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(UserRow::from_tuple))
    }

    /// Find a user by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_row_by_email(&self, email: &str) -> StorageResult<Option<UserRow>> {
        let row: Option<UserTuple> = query_as(
            r#"
            SELECT id, email, password_hash, name, birthday, description, ctime, utime
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(UserRow::from_tuple))
    }

    /// Update name, birthday and description, stamping `utime`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no row has the id.
    pub async fn update_row(&self, update: &ProfileUpdate) -> StorageResult<()> {
        let result = query(
            r#"
            UPDATE users
            SET name = $2, birthday = $3, description = $4, utime = GREATEST($5, ctime)
            WHERE id = $1
            "#,
        )
        .bind(update.id)
        .bind(&update.name)
        .bind(&update.birthday)
        .bind(&update.description)
        .bind(now_millis())
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("user {}", update.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStorage for PostgresUserStorage {
    async fn insert(&self, user: &NewUser) -> StoreResult<i64> {
        Ok(self.insert_row(user).await?)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.find_row_by_id(id).await?.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.find_row_by_email(email).await?.map(User::from))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> StoreResult<()> {
        Ok(self.update_row(update).await?)
    }
}
