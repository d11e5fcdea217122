//! Claims token issuance and validation.
//!
//! This module provides:
//!
//! - The signed claims codec (issue, verify, refresh)
//! - Client fingerprint derivation used to bind tokens to a client

pub mod codec;
pub mod fingerprint;

pub use codec::{ClaimsCodec, CodecError, IssuedToken, UserClaims};
pub use fingerprint::{client_fingerprint, request_fingerprint};
