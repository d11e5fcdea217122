//! Token authentication with sliding refresh.
//!
//! For every request the authenticator decides one of:
//!
//! 1. the path is on the ignore-list: pass through with no identity
//! 2. the credential is missing, malformed, invalid, expired or bound to
//!    another client: reject with the uniform 401
//! 3. the token is valid: attach an [`Identity`], and if less than the refresh
//!    threshold of validity is left, return a re-issued token in the refresh
//!    header of the response

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::{ClaimsCodec, request_fingerprint};

use super::types::Identity;

// =============================================================================
// Outcome
// =============================================================================

/// Result of a successful authentication decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Path is on the ignore-list; no identity is attached.
    Exempt,

    /// Token is valid and has enough validity left.
    Authenticated(Identity),

    /// Token is valid but was re-issued; `token` goes in the refresh header.
    Refreshed {
        /// Identity derived from the refreshed claims.
        identity: Identity,
        /// The re-issued token.
        token: String,
    },
}

impl AuthOutcome {
    /// Returns the identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Exempt => None,
            Self::Authenticated(identity) | Self::Refreshed { identity, .. } => Some(identity),
        }
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// Validates, binds and refreshes bearer tokens.
///
/// Cheap to clone; all fields are immutable after construction and shared.
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    codec: Arc<ClaimsCodec>,
    ignore_paths: Arc<HashSet<String>>,
    token_lifetime: Duration,
    refresh_threshold: Duration,
    refresh_header: HeaderName,
}

impl TokenAuthenticator {
    /// Creates an authenticator around an existing codec.
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` if the refresh header name is invalid.
    pub fn new(codec: Arc<ClaimsCodec>, config: &AuthConfig) -> AuthResult<Self> {
        let refresh_header = HeaderName::from_bytes(config.refresh_header.as_bytes())
            .map_err(|e| AuthError::configuration(format!("refresh header: {e}")))?;

        Ok(Self {
            codec,
            ignore_paths: Arc::new(config.ignore_paths.iter().cloned().collect()),
            token_lifetime: config.token_lifetime,
            refresh_threshold: config.refresh_threshold,
            refresh_header,
        })
    }

    /// Validates `config` and builds the codec and authenticator from it.
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` if the configuration is invalid.
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        let codec = ClaimsCodec::new(config.signing_secret.as_bytes())
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        Self::new(Arc::new(codec), config)
    }

    /// The shared claims codec (used by login to issue tokens).
    #[must_use]
    pub fn codec(&self) -> &Arc<ClaimsCodec> {
        &self.codec
    }

    /// Lifetime given to issued and refreshed tokens.
    #[must_use]
    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    /// Name of the response header carrying issued and refreshed tokens.
    #[must_use]
    pub fn refresh_header(&self) -> &HeaderName {
        &self.refresh_header
    }

    /// Returns `true` if `path` skips authentication (exact match).
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.ignore_paths.contains(path)
    }

    /// Authenticates a request against the current time.
    ///
    /// # Errors
    /// See [`TokenAuthenticator::authenticate_at`].
    pub fn authenticate(&self, path: &str, headers: &HeaderMap) -> AuthResult<AuthOutcome> {
        self.authenticate_at(path, headers, OffsetDateTime::now_utc())
    }

    /// Authenticates a request as of `now`.
    ///
    /// # Errors
    /// Returns an authentication error if the request must be rejected, or
    /// `AuthError::Internal` if a refreshed token could not be signed.
    pub fn authenticate_at(
        &self,
        path: &str,
        headers: &HeaderMap,
        now: OffsetDateTime,
    ) -> AuthResult<AuthOutcome> {
        if self.is_exempt(path) {
            return Ok(AuthOutcome::Exempt);
        }

        let result = self.check_token(headers, now);
        if let Err(err) = &result {
            if err.is_security_event() {
                tracing::warn!(
                    security_event = "fingerprint_mismatch",
                    path = %path,
                    "Token presented by a client it was not issued to"
                );
            } else {
                tracing::debug!(
                    path = %path,
                    reason = err.reason(),
                    error = %err,
                    "Request authentication failed"
                );
            }
        }
        result
    }

    fn check_token(&self, headers: &HeaderMap, now: OffsetDateTime) -> AuthResult<AuthOutcome> {
        let token = extract_token(headers)?;
        let claims = self.codec.verify_at(token, now)?;

        if claims.fingerprint != request_fingerprint(headers) {
            return Err(AuthError::IdentityMismatch);
        }

        let threshold = time::Duration::try_from(self.refresh_threshold)
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        if claims.remaining_at(now) >= threshold {
            return Ok(AuthOutcome::Authenticated(Identity::from(&claims)));
        }

        let issued = self.codec.refresh_at(&claims, self.token_lifetime, now)?;
        tracing::debug!(
            subject_id = issued.claims.subject_id,
            expires_at = issued.claims.exp,
            "Token refreshed"
        );
        Ok(AuthOutcome::Refreshed {
            identity: Identity::from(&issued.claims),
            token: issued.token,
        })
    }
}

/// Extracts the token from an `Authorization: <scheme> <token>` header.
///
/// The header must split into exactly two space-separated segments.
fn extract_token(headers: &HeaderMap) -> AuthResult<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::CredentialMissing)?
        .to_str()
        .map_err(|_| AuthError::credential_malformed("header is not visible ASCII"))?;

    let segments: Vec<&str> = value.split(' ').collect();
    match segments.as_slice() {
        [_scheme, token] => Ok(*token),
        _ => Err(AuthError::credential_malformed(format!(
            "expected 2 segments, got {}",
            segments.len()
        ))),
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Axum middleware applying a [`TokenAuthenticator`] to every request.
///
/// Use with `axum::middleware::from_fn_with_state(authenticator, token_auth_middleware)`.
pub async fn token_auth_middleware(
    State(authenticator): State<TokenAuthenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = match authenticator.authenticate(request.uri().path(), request.headers()) {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    if let Some(identity) = outcome.identity() {
        request.extensions_mut().insert(identity.clone());
    }
    let mut response = next.run(request).await;

    if let AuthOutcome::Refreshed { token, .. } = &outcome {
        match HeaderValue::from_str(token) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(authenticator.refresh_header.clone(), value);
            }
            Err(e) => tracing::error!(error = %e, "Refreshed token is not a valid header value"),
        }
    }
    response
}
