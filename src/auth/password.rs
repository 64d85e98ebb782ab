//! Password hashing with Argon2id.
//!
//! Digests are PHC strings with an embedded random salt, so hashing the same
//! password twice yields different digests.

use argon2::{
    Argon2, PasswordHash,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Errors that can occur during password operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Failed to hash password.
    #[error("failed to hash password: {0}")]
    Hash(String),

    /// Failed to verify password.
    #[error("failed to verify password: {0}")]
    Verify(String),

    /// Stored digest is not a PHC string.
    #[error("invalid password hash format")]
    InvalidHash,
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Verify a password against a stored digest.
///
/// A mismatch is `Ok(false)`; only a malformed digest or an internal failure
/// is an error. The comparison is constant-time.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, CredentialError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| CredentialError::InvalidHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::Verify(e.to_string())),
    }
}
