//! Storage interface for user records.
//!
//! # Implementations
//!
//! - `profiled-auth-postgres` - PostgreSQL storage backend

pub mod user;

pub use user::{NewUser, ProfileUpdate, StoreError, StoreResult, User, UserStorage, now_millis};
