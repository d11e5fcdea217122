//! User operations behind the HTTP handlers.

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use profiled_auth::{NewUser, PasswordVerifier, ProfileUpdate, User};

use crate::repository::{RepositoryError, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Unknown email or wrong password; deliberately indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("user not found")]
    NotFound,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::DuplicateEmail => Self::DuplicateEmail,
            RepositoryError::Unexpected { message } => Self::Unexpected(message),
        }
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Hashing(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Sign-up, login, edit and profile reads.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<UserRepository>,
    passwords: Arc<dyn PasswordVerifier>,
}

impl UserService {
    pub fn new(repo: Arc<UserRepository>, passwords: Arc<dyn PasswordVerifier>) -> Self {
        Self { repo, passwords }
    }

    /// Registers a new user and returns its id.
    pub async fn sign_up(&self, email: &str, password: &str) -> ServiceResult<i64> {
        let hash = self.hash_password(password).await?;
        let id = self.repo.create(&NewUser::new(email, hash)).await?;
        tracing::info!(subject_id = id, "user signed up");
        Ok(id)
    }

    /// Checks credentials and returns the full user record.
    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<User> {
        let user = match self.repo.find_by_email(email).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound) => return Err(ServiceError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };
        let Some(hash) = user.password_hash.clone() else {
            return Err(ServiceError::Unexpected(
                "stored user has no password hash".into(),
            ));
        };

        let passwords = Arc::clone(&self.passwords);
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
            .await
            .map_err(|e| ServiceError::Unexpected(e.to_string()))?
            .map_err(|e| ServiceError::Hashing(e.to_string()))?;

        if !matches {
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Updates name, birthday and description of a user.
    pub async fn edit(&self, update: &ProfileUpdate) -> ServiceResult<()> {
        self.repo.update(update).await?;
        Ok(())
    }

    /// Reads a user's profile (through the cache).
    pub async fn profile(&self, id: i64) -> ServiceResult<User> {
        Ok(self.repo.find_by_id(id).await?)
    }

    async fn hash_password(&self, password: &str) -> ServiceResult<String> {
        let passwords = Arc::clone(&self.passwords);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| ServiceError::Unexpected(e.to_string()))?
            .map_err(|e| ServiceError::Hashing(e.to_string()))
    }
}
