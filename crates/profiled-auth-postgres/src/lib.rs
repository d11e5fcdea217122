//! PostgreSQL storage backend for profiled-auth
//!
//! Stores user records in a single `users` table and implements the
//! `UserStorage` trait over a shared connection pool.
//!
//! # Example
//!
//! ```ignore
//! use profiled_auth_postgres::{PostgresUserStorage, connect, ensure_schema};
//!
//! let pool = connect("postgres://localhost/profiled", 10, Duration::from_secs(5)).await?;
//! ensure_schema(&pool).await?;
//! let storage = PostgresUserStorage::new(Arc::new(pool));
//! let user = storage.find_by_email("a@example.com").await?;
//! ```

pub mod user;

use std::time::Duration;

use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_core::query::query;
use sqlx_postgres::Postgres;

use profiled_auth::StoreError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use user::{PostgresUserStorage, UserRow};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during user storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (unique constraint).
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Returns `true` if the database could not be reached.
    #[must_use]
    pub fn is_connectivity_error(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::Io(_)
                    | sqlx_core::Error::Tls(_)
                    | sqlx_core::Error::WorkerCrashed
            )
        )
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        if err.is_connectivity_error() {
            return StoreError::unavailable(err.to_string());
        }
        match err {
            StorageError::NotFound(_) => StoreError::NotFound,
            StorageError::Conflict(_) => StoreError::DuplicateEmail,
            StorageError::Database(e) => StoreError::internal(e.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Pool and schema
// =============================================================================

/// Opens a connection pool.
///
/// # Errors
///
/// Returns an error if the first connection cannot be established.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> StorageResult<PgPool> {
    let pool = PoolOptions::<Postgres>::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;
    Ok(pool)
}

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            BIGSERIAL PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    name          TEXT NOT NULL DEFAULT '',
    birthday      TEXT NOT NULL DEFAULT '',
    description   TEXT NOT NULL DEFAULT '',
    ctime         BIGINT NOT NULL,
    utime         BIGINT NOT NULL
)
"#;

/// Creates the `users` table if it does not exist.
///
/// # Errors
///
/// Returns an error if the DDL statement fails.
pub async fn ensure_schema(pool: &PgPool) -> StorageResult<()> {
    query(CREATE_USERS_TABLE).execute(pool).await?;
    tracing::debug!("users table ready");
    Ok(())
}
