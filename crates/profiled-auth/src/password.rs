//! Password hashing and verification.
//!
//! Hashing uses Argon2id with default parameters and a random salt from
//! `OsRng`. Hashes are stored as PHC strings, so a stored hash never equals
//! the plaintext it was derived from.
//!
//! # Example
//!
//! ```
//! use profiled_auth::password::{Argon2Verifier, PasswordVerifier};
//!
//! let verifier = Argon2Verifier::new();
//! let hash = verifier.hash("hello#world123").unwrap();
//! assert!(hash.starts_with("$argon2id$"));
//! assert!(verifier.verify("hello#world123", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};

/// Errors from password hashing.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Hashing the plaintext failed.
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// The stored hash is not a valid PHC string.
    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hashes and compares user passwords.
pub trait PasswordVerifier: Send + Sync {
    /// Hashes a plaintext password for storage.
    ///
    /// # Errors
    /// Returns `PasswordError::Hashing` if the hasher fails.
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// Compares a plaintext password against a stored hash.
    ///
    /// `Ok(false)` means the password does not match.
    ///
    /// # Errors
    /// Returns `PasswordError::MalformedHash` if the stored hash cannot be parsed.
    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, PasswordError>;
}

/// Argon2id password verifier.
#[derive(Debug, Clone, Default)]
pub struct Argon2Verifier {
    argon2: Argon2<'static>,
}

impl Argon2Verifier {
    /// Creates a verifier with default Argon2id parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordVerifier for Argon2Verifier {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        Ok(self
            .argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}
