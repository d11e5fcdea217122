//! Authentication error types.
//!
//! Every authentication failure has its own variant so it can be logged
//! and counted separately. At the HTTP boundary they all collapse into the
//! same unauthorized response (see `middleware::error`).

use std::fmt;

use crate::token::CodecError;

/// Errors that can occur while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("Credential missing")]
    CredentialMissing,

    /// The credential header is not a two-part `"<scheme> <token>"` value.
    #[error("Credential malformed: {message}")]
    CredentialMalformed {
        /// Description of why the credential is malformed.
        message: String,
    },

    /// The token failed to parse or its signature did not verify.
    #[error("Token invalid: {message}")]
    TokenInvalid {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The token's expiry has passed.
    #[error("Token expired")]
    TokenExpired,

    /// The token was issued to a different client fingerprint.
    #[error("Identity mismatch: token bound to another client")]
    IdentityMismatch,

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred (e.g. signing a refreshed token).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `CredentialMalformed` error.
    #[must_use]
    pub fn credential_malformed(message: impl Into<String>) -> Self {
        Self::CredentialMalformed {
            message: message.into(),
        }
    }

    /// Creates a new `TokenInvalid` error.
    #[must_use]
    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::TokenInvalid {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
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

    /// Returns `true` if this is a server-side failure.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Internal { .. })
    }

    /// Returns `true` if the failure suggests a replayed token.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::IdentityMismatch)
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CredentialMissing | Self::CredentialMalformed { .. } => {
                ErrorCategory::Credential
            }
            Self::TokenInvalid { .. } | Self::TokenExpired => ErrorCategory::Token,
            Self::IdentityMismatch => ErrorCategory::Binding,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Short machine-readable reason used as a log field.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CredentialMissing => "credential_missing",
            Self::CredentialMalformed { .. } => "credential_malformed",
            Self::TokenInvalid { .. } => "token_invalid",
            Self::TokenExpired => "token_expired",
            Self::IdentityMismatch => "identity_mismatch",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<CodecError> for AuthError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Expired => Self::TokenExpired,
            CodecError::Malformed { .. } | CodecError::BadSignature => {
                Self::token_invalid(err.to_string())
            }
            CodecError::Encoding { .. } | CodecError::InvalidTtl | CodecError::InvalidKey { .. } => {
                Self::internal(err.to_string())
            }
        }
    }
}

/// Categories of authentication errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or malformed credential header.
    Credential,
    /// Token parse, signature or expiry failure.
    Token,
    /// Token presented by a client it was not issued to.
    Binding,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::Token => write!(f, "token"),
            Self::Binding => write!(f, "binding"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
