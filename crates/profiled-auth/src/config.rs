//! Authentication configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! signing_secret = "change-me-to-at-least-32-random-bytes"
//! token_lifetime = "60s"
//! refresh_threshold = "30s"
//! refresh_header = "x-jwt-token"
//! ignore_paths = ["/users/login", "/users/signup", "/hello", "/healthz"]
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum accepted length of the HMAC signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required field is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Why the value is invalid.
        message: String,
    },
}

/// Token lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret used to sign tokens. Fixed for the process lifetime.
    pub signing_secret: String,

    /// Lifetime of an issued (or refreshed) token.
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// A token with less than this much validity left is re-issued.
    #[serde(with = "humantime_serde")]
    pub refresh_threshold: Duration,

    /// Response header carrying issued and refreshed tokens.
    pub refresh_header: String,

    /// Exact request paths that skip authentication.
    pub ignore_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            token_lifetime: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(30),
            refresh_header: "x-jwt-token".to_string(),
            ignore_paths: vec![
                "/users/login".to_string(),
                "/users/signup".to_string(),
                "/hello".to_string(),
                "/healthz".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_secret.is_empty() {
            return Err(ConfigError::MissingField("auth.signing_secret"));
        }
        if self.signing_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue {
                field: "auth.signing_secret",
                message: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }
        if self.token_lifetime.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.token_lifetime",
                message: "must be at least one second".to_string(),
            });
        }
        if self.refresh_threshold >= self.token_lifetime {
            return Err(ConfigError::InvalidValue {
                field: "auth.refresh_threshold",
                message: "must be shorter than auth.token_lifetime".to_string(),
            });
        }
        if axum::http::HeaderName::from_bytes(self.refresh_header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "auth.refresh_header",
                message: format!("'{}' is not a valid header name", self.refresh_header),
            });
        }
        if let Some(path) = self.ignore_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::InvalidValue {
                field: "auth.ignore_paths",
                message: format!("'{path}' must start with '/'"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AuthConfig {
        AuthConfig {
            signing_secret: "k6CswdUm77WKcbM68UQUuxVsHSpTCwgK".to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.token_lifetime, Duration::from_secs(60));
        assert_eq!(config.refresh_threshold, Duration::from_secs(30));
        assert_eq!(config.refresh_header, "x-jwt-token");
        assert!(config.ignore_paths.contains(&"/users/login".to_string()));
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_secret() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("auth.signing_secret")));
    }

    #[test]
    fn test_short_secret() {
        let config = AuthConfig {
            signing_secret: "short".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_must_be_below_lifetime() {
        let config = AuthConfig {
            refresh_threshold: Duration::from_secs(60),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.refresh_threshold"));
    }

    #[test]
    fn test_invalid_header_name() {
        let config = AuthConfig {
            refresh_header: "x jwt".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_ignore_path() {
        let config = AuthConfig {
            ignore_paths: vec!["users/login".to_string()],
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_humantime_deserialization() {
        let json = r#"{"signing_secret":"x","token_lifetime":"2m","refresh_threshold":"45s"}"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.token_lifetime, Duration::from_secs(120));
        assert_eq!(config.refresh_threshold, Duration::from_secs(45));
        assert_eq!(config.refresh_header, "x-jwt-token");
    }
}
