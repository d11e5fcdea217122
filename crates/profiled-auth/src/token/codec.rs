//! Signed claims codec.
//!
//! Tokens are HS512 JWTs signed with a process-wide secret that is injected
//! at construction time. The claims carry the subject id, the client
//! fingerprint the token is bound to, and issue/expiry timestamps in Unix
//! seconds.
//!
//! Expiry is checked here against an explicit `now` instead of by the JWT
//! library, so that callers (and tests) control the clock. The fingerprint
//! is NOT checked here; that belongs to the request authenticator.
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use profiled_auth::token::{ClaimsCodec, client_fingerprint};
//!
//! let codec = ClaimsCodec::new(secret)?;
//! let issued = codec.issue(42, &client_fingerprint(user_agent), Duration::from_secs(60))?;
//! let claims = codec.verify(&issued.token)?;
//! assert_eq!(claims.subject_id, 42);
//! ```

use std::fmt;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const ALGORITHM: Algorithm = Algorithm::HS512;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while issuing or verifying a claims token.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The token is not a structurally valid JWT with the expected claims.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the decoding failure.
        message: String,
    },

    /// The signature (or the signing algorithm) did not verify.
    #[error("Invalid signature")]
    BadSignature,

    /// The token's expiry is at or before the verification time.
    #[error("Token expired")]
    Expired,

    /// Failed to sign a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// The requested lifetime would not produce `exp > iat`.
    #[error("Token lifetime must be at least one second")]
    InvalidTtl,

    /// The signing key is unusable.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl CodecError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for CodecError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::BadSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::malformed(err.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by a user token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserClaims {
    /// Id of the authenticated user.
    #[serde(rename = "uid")]
    pub subject_id: i64,

    /// Fingerprint of the client the token was issued to.
    #[serde(rename = "fp")]
    pub fingerprint: String,

    /// Issued at (Unix timestamp, seconds).
    pub iat: i64,

    /// Expiration time (Unix timestamp, seconds).
    pub exp: i64,
}

impl UserClaims {
    /// Returns the validity left at `now` (negative once expired).
    #[must_use]
    pub fn remaining_at(&self, now: OffsetDateTime) -> time::Duration {
        time::Duration::seconds(self.exp - now.unix_timestamp())
    }

    /// Returns `true` if the token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now.unix_timestamp() >= self.exp
    }
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWT string.
    pub token: String,
    /// Claims encoded in `token`.
    pub claims: UserClaims,
}

// ============================================================================
// Codec
// ============================================================================

/// Issues and verifies signed claims tokens.
///
/// Holds only immutable key material, so one instance is shared across all
/// request tasks behind an `Arc`.
pub struct ClaimsCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for ClaimsCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimsCodec")
            .field("algorithm", &ALGORITHM)
            .finish_non_exhaustive()
    }
}

impl ClaimsCodec {
    /// Creates a codec signing with the given shared secret.
    ///
    /// # Errors
    /// Returns `InvalidKey` if the secret is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CodecError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CodecError::invalid_key("signing secret is empty"));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false; // checked against the caller's clock
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Issues a token for `subject_id` bound to `fingerprint`, valid for `ttl`.
    ///
    /// # Errors
    /// Returns an error if `ttl` is shorter than one second or signing fails.
    pub fn issue(
        &self,
        subject_id: i64,
        fingerprint: &str,
        ttl: Duration,
    ) -> Result<IssuedToken, CodecError> {
        self.issue_at(subject_id, fingerprint, ttl, OffsetDateTime::now_utc())
    }

    /// Issues a token as of `now`.
    ///
    /// # Errors
    /// Returns an error if `ttl` is shorter than one second or signing fails.
    pub fn issue_at(
        &self,
        subject_id: i64,
        fingerprint: &str,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, CodecError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| CodecError::InvalidTtl)?;
        if ttl_secs < 1 {
            return Err(CodecError::InvalidTtl);
        }

        let iat = now.unix_timestamp();
        let claims = UserClaims {
            subject_id,
            fingerprint: fingerprint.to_string(),
            iat,
            exp: iat + ttl_secs,
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| CodecError::encoding(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Re-issues `claims` with a fresh lifetime starting at `now`.
    ///
    /// Subject and fingerprint are carried over unchanged.
    ///
    /// # Errors
    /// Returns an error if `ttl` is shorter than one second or signing fails.
    pub fn refresh_at(
        &self,
        claims: &UserClaims,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, CodecError> {
        self.issue_at(claims.subject_id, &claims.fingerprint, ttl, now)
    }

    /// Verifies a token against the current time.
    ///
    /// # Errors
    /// Returns `Malformed`, `BadSignature` or `Expired`.
    pub fn verify(&self, token: &str) -> Result<UserClaims, CodecError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Verifies a token as of `now`.
    ///
    /// The signature is checked before expiry, so a forged token never
    /// reports `Expired`.
    ///
    /// # Errors
    /// Returns `Malformed`, `BadSignature` or `Expired`.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<UserClaims, CodecError> {
        let claims = decode::<UserClaims>(token, &self.decoding_key, &self.validation)?.claims;

        if claims.is_expired_at(now) {
            return Err(CodecError::Expired);
        }

        Ok(claims)
    }
}

// ============================================================================
// Tests
// ============================================================================
