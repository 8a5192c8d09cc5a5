// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passphrase hashing (Argon2id, PHC string format).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash passphrase: {0}")]
    Hash(String),

    #[error("stored passphrase hash is malformed: {0}")]
    MalformedHash(String),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Hash a passphrase with a fresh random salt.
pub fn hash_passphrase(passphrase: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check a passphrase against a stored hash.
///
/// A mismatch is `Ok(false)`; only an unreadable hash is an error.
pub fn verify_passphrase(passphrase: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(passphrase.as_bytes(), &parsed)
        .is_ok())
}

/// [`hash_passphrase`] on the blocking thread pool.
pub async fn spawn_hash(passphrase: &str) -> Result<String, PasswordError> {
    let passphrase = passphrase.to_owned();
    tokio::task::spawn_blocking(move || hash_passphrase(&passphrase))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
}

/// [`verify_passphrase`] on the blocking thread pool.
pub async fn spawn_verify(passphrase: &str, stored: &str) -> Result<bool, PasswordError> {
    let (passphrase, stored) = (passphrase.to_owned(), stored.to_owned());
    tokio::task::spawn_blocking(move || verify_passphrase(&passphrase, &stored))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_passphrase("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_passphrase("correct horse battery staple", &hash).unwrap());
        assert!(!verify_passphrase("Correct horse battery staple", &hash).unwrap());
    }

    #[test]
    fn salts_differ() {
        let a = hash_passphrase("same").unwrap();
        let b = hash_passphrase("same").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn pooled_hash_and_verify() {
        let hash = spawn_hash("off the runtime").await.unwrap();
        assert!(spawn_verify("off the runtime", &hash).await.unwrap());
        assert!(!spawn_verify("on the runtime", &hash).await.unwrap());
        assert!(matches!(
            spawn_verify("x", "garbage").await,
            Err(PasswordError::MalformedHash(_))
        ));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            verify_passphrase("x", "not-a-phc-string"),
            Err(PasswordError::MalformedHash(_))
        ));
    }
}
