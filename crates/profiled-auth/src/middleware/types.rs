//! Authenticated request context.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AuthError;
use crate::token::UserClaims;

/// The authenticated caller of a request.
///
/// Inserted into request extensions by the token middleware and read by
/// handlers through the extractor impl. Never present on exempt paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User id the token was issued to.
    pub subject_id: i64,

    /// Client fingerprint the token is bound to.
    pub fingerprint: String,

    /// Expiry (unix seconds) of the token now in effect for this client.
    pub expires_at: i64,
}

impl From<&UserClaims> for Identity {
    fn from(claims: &UserClaims) -> Self {
        Self {
            subject_id: claims.subject_id,
            fingerprint: claims.fingerprint.clone(),
            expires_at: claims.exp,
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::CredentialMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_extract_identity_from_extensions() {
        let identity = Identity {
            subject_id: 42,
            fingerprint: "fp".to_string(),
            expires_at: 100,
        };
        let (mut parts, ()) = Request::builder()
            .uri("/users/profile")
            .extension(identity.clone())
            .body(())
            .unwrap()
            .into_parts();

        let extracted = Identity::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted, identity);
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let (mut parts, ()) = Request::builder()
            .uri("/users/profile")
            .body(())
            .unwrap()
            .into_parts();

        let err = Identity::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AuthError::CredentialMissing));
    }

    #[test]
    fn test_from_claims() {
        let claims = UserClaims {
            subject_id: 5,
            fingerprint: "abc".to_string(),
            iat: 10,
            exp: 70,
        };
        let identity = Identity::from(&claims);
        assert_eq!(identity.subject_id, 5);
        assert_eq!(identity.expires_at, 70);
    }
}
