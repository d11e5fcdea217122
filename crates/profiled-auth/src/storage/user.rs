//! User storage trait.
//!
//! Defines the interface for user persistence operations.
//! Implementations are provided by storage backends (e.g., PostgreSQL).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// A persisted user record.
///
/// The store is the source of truth for this record. `ctime` and `utime`
/// are epoch milliseconds and `utime >= ctime` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier.
    pub id: i64,

    /// Unique email address.
    pub email: String,

    /// Argon2id PHC hash. `None` when loaded from a snapshot that omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Birthday as `YYYY-MM-DD`.
    #[serde(default)]
    pub birthday: String,

    /// Free-form self description.
    #[serde(default)]
    pub description: String,

    /// Creation time (epoch ms).
    pub ctime: i64,

    /// Last update time (epoch ms).
    pub utime: i64,
}

impl User {
    /// Returns a copy of this record without the password hash.
    #[must_use]
    pub fn without_password(&self) -> Self {
        Self {
            password_hash: None,
            ..self.clone()
        }
    }
}

/// Fields supplied at sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Email address; must not already be registered.
    pub email: String,
    /// Already-hashed password.
    pub password_hash: String,
}

impl NewUser {
    /// Creates a new sign-up record.
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
        }
    }
}

/// Profile fields an edit may change. Email, hash and `ctime` are never touched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// User to update.
    pub id: i64,
    /// New display name.
    pub name: String,
    /// New birthday (`YYYY-MM-DD`).
    pub birthday: String,
    /// New description.
    pub description: String,
}

/// Errors returned by user storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No user matched the key.
    #[error("User not found")]
    NotFound,

    /// The email is already registered.
    #[error("Email already registered")]
    DuplicateEmail,

    /// Transient failure reaching the backend (pool, network, timeout).
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// Any other backend failure.
    #[error("Storage error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for failures a retry might resolve.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operations for user records.
///
/// Absence on lookup is `Ok(None)`, never an error.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Inserts a new user, stamping `ctime = utime = now`, and returns its id.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateEmail` if the email is taken.
    async fn insert(&self, user: &NewUser) -> StoreResult<i64>;

    /// Finds a user by id.
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;

    /// Finds a user by email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Updates name, birthday and description, stamping `utime = now`.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if no row has `update.id`.
    async fn update_profile(&self, update: &ProfileUpdate) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        User {
            id: 7,
            email: "a@example.com".to_string(),
            password_hash: Some("$argon2id$v=19$...".to_string()),
            name: "Ann".to_string(),
            birthday: "1990-01-02".to_string(),
            description: "hi".to_string(),
            ctime: 1_700_000_000_000,
            utime: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_without_password() {
        let user = sample().without_password();
        assert!(user.password_hash.is_none());
        assert_eq!(user.email, "a@example.com");
    }

    #[test]
    fn test_hash_omitted_from_json_when_absent() {
        let json = serde_json::to_value(sample().without_password()).unwrap();
        assert!(json.get("password_hash").is_none());

        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("password_hash").is_some());
    }

    #[test]
    fn test_now_millis_is_recent() {
        let ms = now_millis();
        assert!(ms > 1_600_000_000_000);
    }

    #[test]
    fn test_store_error_predicates() {
        assert!(StoreError::unavailable("pool timed out").is_transient());
        assert!(!StoreError::DuplicateEmail.is_transient());
        assert_eq!(StoreError::NotFound.to_string(), "User not found");
    }
}
