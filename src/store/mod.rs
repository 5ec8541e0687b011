//! Persistence boundary for refresh records and single-use action tokens.
//!
//! Backends only ever see SHA-256 digests of token values. Every method that
//! removes a row reports what it removed, so the caller that wins a delete is the
//! only one allowed to act on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;
pub mod purge;

pub use memory::MemoryTokenStore;
pub use postgres::PgTokenStore;
pub use purge::{
    spawn_purge_task, PurgeSchedule, DEFAULT_PURGE_INTERVAL, DEFAULT_PURGE_RETENTION,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("duplicate token")]
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Refresh,
    PasswordReset,
    EmailVerification,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "refresh" => Ok(Self::Refresh),
            "password_reset" => Ok(Self::PasswordReset),
            "email_verification" => Ok(Self::EmailVerification),
            other => Err(StoreError::Backend(format!("unknown token kind: {other}"))),
        }
    }
}

/// One stored token: a refresh record or an outstanding action token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: Uuid,
    pub kind: TokenKind,
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub created_at: i64,
    pub expires_at: i64,
}

impl TokenRecord {
    #[must_use]
    pub fn new(
        kind: TokenKind,
        token_hash: Vec<u8>,
        user_id: Uuid,
        created_at: i64,
        expires_at: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            token_hash,
            user_id,
            created_at,
            expires_at,
        }
    }

    /// Expiry is strict: a record expiring this very second is dead.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Left behind by `replace` for the digest it removed: which record took its place
/// and when. Kept until the removed token would have expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationMark {
    pub kind: TokenKind,
    pub old_hash: Vec<u8>,
    pub successor_hash: Vec<u8>,
    pub user_id: Uuid,
    pub rotated_at: i64,
    pub expires_at: i64,
}

impl RotationMark {
    #[must_use]
    pub fn new(old: &TokenRecord, successor: &TokenRecord) -> Self {
        Self {
            kind: old.kind,
            old_hash: old.token_hash.clone(),
            successor_hash: successor.token_hash.clone(),
            user_id: old.user_id,
            rotated_at: successor.created_at,
            expires_at: old.expires_at,
        }
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a record.
    ///
    /// # Errors
    /// `Conflict` if the digest is already stored.
    async fn put(&self, record: TokenRecord) -> Result<(), StoreError>;

    /// Atomically find and delete the record of `kind` with this digest.
    async fn take(&self, kind: TokenKind, token_hash: &[u8])
        -> Result<Option<TokenRecord>, StoreError>;

    /// Atomically delete the record with `old_hash` and, only if it existed, insert
    /// `replacement` and a [`RotationMark`] for `old_hash`. Returns the deleted
    /// record.
    async fn replace(
        &self,
        kind: TokenKind,
        old_hash: &[u8],
        replacement: TokenRecord,
    ) -> Result<Option<TokenRecord>, StoreError>;

    /// Non-destructive lookup.
    async fn find(&self, kind: TokenKind, token_hash: &[u8])
        -> Result<Option<TokenRecord>, StoreError>;

    /// The mark `replace` left for `old_hash`, unless it was purged or revoked.
    async fn find_rotation(
        &self,
        kind: TokenKind,
        old_hash: &[u8],
    ) -> Result<Option<RotationMark>, StoreError>;

    /// A live (`now < expires_at`) record of `kind` for the user, if any.
    async fn find_live_for_user(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        now: i64,
    ) -> Result<Option<TokenRecord>, StoreError>;

    /// Insert `record` only when its user has no live record of the same kind.
    /// The check and the insert are one atomic step.
    async fn insert_unless_live(&self, record: TokenRecord, now: i64)
        -> Result<bool, StoreError>;

    /// Delete every record of the user, optionally restricted to one kind, along
    /// with the user's rotation marks of that kind. Returns the number of records.
    async fn delete_all_for_user(
        &self,
        user_id: Uuid,
        kind: Option<TokenKind>,
    ) -> Result<u64, StoreError>;

    /// All records of `kind` for the user, expired or not.
    async fn records_for_user(
        &self,
        user_id: Uuid,
        kind: TokenKind,
    ) -> Result<Vec<TokenRecord>, StoreError>;

    /// Delete every record and rotation mark with `expires_at <= cutoff`.
    async fn purge_expired(&self, cutoff: i64) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kind_round_trips_through_str() -> Result<(), StoreError> {
        for kind in [
            TokenKind::Refresh,
            TokenKind::PasswordReset,
            TokenKind::EmailVerification,
        ] {
            assert_eq!(kind.as_str().parse::<TokenKind>()?, kind);
        }
        assert!("session".parse::<TokenKind>().is_err());
        Ok(())
    }

    #[test]
    fn record_expiry_is_strict() {
        let record = TokenRecord::new(TokenKind::PasswordReset, vec![1], Uuid::nil(), 10, 20);
        assert!(!record.is_expired(19));
        assert!(record.is_expired(20));
        assert!(record.is_expired(21));
    }

    #[test]
    fn rotation_mark_takes_time_from_successor() {
        let user = Uuid::new_v4();
        let old = TokenRecord::new(TokenKind::Refresh, vec![1], user, 10, 500);
        let successor = TokenRecord::new(TokenKind::Refresh, vec![2], user, 42, 900);
        let mark = RotationMark::new(&old, &successor);
        assert_eq!(mark.old_hash, vec![1]);
        assert_eq!(mark.successor_hash, vec![2]);
        assert_eq!(mark.rotated_at, 42);
        assert_eq!(mark.expires_at, 500);
        assert_eq!(mark.user_id, user);
    }
}
