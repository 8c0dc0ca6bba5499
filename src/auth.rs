use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::limits::{MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    WeakPassword(&'static str),
    /// The stored hash could not be produced or parsed.
    Hash(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::WeakPassword(msg) => write!(f, "weak password: {msg}"),
            AuthError::Hash(e) => write!(f, "password hash error: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

pub fn check_password_policy(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword("too short"));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AuthError::WeakPassword("too long"));
    }
    if password.chars().any(char::is_whitespace) {
        return Err(AuthError::WeakPassword("must not contain whitespace"));
    }
    Ok(())
}

/// Argon2id with a fresh random salt, returned as a PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    check_password_policy(password)?;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Constant-time check of `password` against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored).map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
