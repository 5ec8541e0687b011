//! Opaque one-way password hashing.

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordVerifier};
use rand::rngs::OsRng;

use super::error::{AuthError, Result};

pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a self-describing PHC string.
    ///
    /// # Errors
    /// `Internal` if hashing fails.
    fn hash(&self, password: &str) -> Result<String>;

    /// Compare a plaintext password with a stored hash. An unparsable hash is a
    /// mismatch, not an error.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id with the crate defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordHasher;

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String> {
        use argon2::PasswordHasher as _;

        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Internal(format!("failed to hash password: {err}")))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() -> Result<()> {
        let hasher = Argon2PasswordHasher;
        let hash = hasher.hash("correct horse")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("battery staple", &hash));
        Ok(())
    }

    #[test]
    fn salts_differ() -> Result<()> {
        let hasher = Argon2PasswordHasher;
        assert_ne!(hasher.hash("same")?, hasher.hash("same")?);
        Ok(())
    }

    #[test]
    fn garbage_hash_is_a_mismatch() {
        assert!(!Argon2PasswordHasher.verify("anything", "not-a-phc-string"));
    }
}
