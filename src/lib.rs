//! # noteauth
//!
//! Session and single-use token lifecycle for the notes service.
//!
//! ## Sessions
//!
//! A login yields a short-lived HMAC-signed **access token** and a longer-lived
//! **refresh token**. Refresh tokens rotate on every use: the presented token is
//! deleted from the store and a successor is issued in the same atomic step.
//! Presenting a token that was already rotated away is treated as theft and
//! revokes every refresh token of that user.
//!
//! ## Action tokens
//!
//! Password reset and email verification use opaque random tokens. At most one
//! live token of each kind exists per user, and consuming a token deletes it
//! together with any sibling of the same kind.
//!
//! ## Storage
//!
//! Only SHA-256 digests of token values are persisted. Backends are either
//! in-memory (local runs, tests) or Postgres through `sqlx`.

pub mod api;
pub mod cli;
pub mod store;
pub mod tokens;
pub mod users;

pub use api::GIT_COMMIT_HASH;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
