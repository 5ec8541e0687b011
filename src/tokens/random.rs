//! Random identifiers and the digests stored in place of raw tokens.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::error::{AuthError, Result};

const TOKEN_BYTES: usize = 32;

pub trait SecureRandom: Send + Sync {
    /// Opaque, URL-safe, unguessable token.
    ///
    /// # Errors
    /// Returns an error if the entropy source fails.
    fn token(&self) -> Result<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OsSecureRandom;

impl SecureRandom for OsSecureRandom {
    fn token(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| AuthError::Internal(format!("failed to generate token: {err}")))?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}

/// Hash a token so the raw value never reaches the store.
/// The digest is what lookups and deletes are keyed on.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_decodes_to_32_bytes() -> Result<()> {
        let token = OsSecureRandom.token()?;
        let decoded = Base64UrlUnpadded::decode_vec(&token).map(|bytes| bytes.len());
        assert_eq!(decoded.ok(), Some(32));
        Ok(())
    }

    #[test]
    fn tokens_do_not_repeat() -> Result<()> {
        assert_ne!(OsSecureRandom.token()?, OsSecureRandom.token()?);
        Ok(())
    }

    #[test]
    fn hash_token_stable() {
        let first = hash_token("token");
        let second = hash_token("token");
        let different = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }
}
