//! HTTP middleware for token authentication.
//!
//! This module provides:
//!
//! - [`TokenAuthenticator`]: the per-request validate / bind / refresh decision
//! - [`token_auth_middleware`]: the Axum layer applying it
//! - [`Identity`]: the typed extractor handlers use to read the caller
//! - the uniform unauthorized response for every rejection
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use profiled_auth::{Identity, TokenAuthenticator, token_auth_middleware};
//!
//! async fn whoami(identity: Identity) -> String {
//!     identity.subject_id.to_string()
//! }
//!
//! let authenticator = TokenAuthenticator::from_config(&config)?;
//! let app = Router::new()
//!     .route("/whoami", get(whoami))
//!     .layer(middleware::from_fn_with_state(authenticator, token_auth_middleware));
//! ```

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{AuthOutcome, TokenAuthenticator, token_auth_middleware};
pub use error::unauthorized_response;
pub use types::Identity;
