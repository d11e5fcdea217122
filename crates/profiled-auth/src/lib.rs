//! # profiled-auth
//!
//! Authentication core for the profiled service.
//!
//! This crate provides:
//! - Signed claims tokens bound to a client fingerprint
//! - A request authenticator with sliding token refresh
//! - Password hashing and verification
//! - The user record type and the storage trait backends implement
//!
//! ## Modules
//!
//! - [`config`] - Token lifetimes, refresh threshold and ignore-list
//! - [`token`] - Claims codec (issue, verify, refresh)
//! - [`middleware`] - Axum middleware and the `Identity` extractor
//! - [`password`] - Argon2id password hashing
//! - [`storage`] - User record and `UserStorage` trait

pub mod config;
pub mod error;
pub mod middleware;
pub mod password;
pub mod storage;
pub mod token;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use middleware::{AuthOutcome, Identity, TokenAuthenticator, token_auth_middleware};
pub use password::{Argon2Verifier, PasswordError, PasswordVerifier};
pub use storage::{NewUser, ProfileUpdate, StoreError, StoreResult, User, UserStorage};
pub use token::{
    ClaimsCodec, CodecError, IssuedToken, UserClaims, client_fingerprint, request_fingerprint,
};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
