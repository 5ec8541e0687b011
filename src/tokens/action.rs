//! Single-use, time-bound action tokens (password reset, email verification).
//!
//! At most one live token exists per (user, kind). Consuming one deletes every
//! token of that kind for the user, so an older link cannot be used afterwards.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::clock::Clock;
use super::error::{AuthError, Result};
use super::random::{hash_token, SecureRandom};
use crate::store::{TokenKind, TokenRecord, TokenStore};

const DEFAULT_ACTION_TTL_SECONDS: i64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PasswordReset,
    EmailVerification,
}

impl From<ActionKind> for TokenKind {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::PasswordReset => Self::PasswordReset,
            ActionKind::EmailVerification => Self::EmailVerification,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TokenKind::from(*self).as_str())
    }
}

pub struct ActionTokenManager {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn SecureRandom>,
    password_reset_ttl_seconds: i64,
    email_verification_ttl_seconds: i64,
}

impl ActionTokenManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn SecureRandom>,
    ) -> Self {
        Self {
            store,
            clock,
            random,
            password_reset_ttl_seconds: DEFAULT_ACTION_TTL_SECONDS,
            email_verification_ttl_seconds: DEFAULT_ACTION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, kind: ActionKind, seconds: i64) -> Self {
        match kind {
            ActionKind::PasswordReset => self.password_reset_ttl_seconds = seconds,
            ActionKind::EmailVerification => self.email_verification_ttl_seconds = seconds,
        }
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self, kind: ActionKind) -> i64 {
        match kind {
            ActionKind::PasswordReset => self.password_reset_ttl_seconds,
            ActionKind::EmailVerification => self.email_verification_ttl_seconds,
        }
    }

    /// Create and persist a new token unless one is already live for the user.
    /// An outstanding token is never replaced.
    ///
    /// # Errors
    /// `AlreadyOutstanding`, `Internal` or `Store`.
    pub async fn request(&self, user_id: Uuid, kind: ActionKind) -> Result<String> {
        let ttl = self.ttl_seconds(kind);
        if ttl <= 0 {
            return Err(AuthError::Internal(format!("{kind} ttl must be positive")));
        }

        let now = self.clock.now();
        let token = self.random.token()?;
        let record = TokenRecord::new(
            kind.into(),
            hash_token(&token),
            user_id,
            now,
            now.saturating_add(ttl),
        );

        if !self.store.insert_unless_live(record, now).await? {
            debug!(user_id = %user_id, kind = %kind, "action token already outstanding");
            return Err(AuthError::AlreadyOutstanding);
        }

        debug!(user_id = %user_id, kind = %kind, "issued action token");
        Ok(token)
    }

    /// Use a token once and return its user.
    ///
    /// # Errors
    /// `NotFound` if unknown or already used, `Expired` if `now >= expires_at`
    /// (the user's tokens of this kind are dropped either way), or `Store`.
    pub async fn consume(&self, token: &str, kind: ActionKind) -> Result<Uuid> {
        let record = self
            .store
            .take(kind.into(), &hash_token(token))
            .await?
            .ok_or(AuthError::NotFound)?;

        self.store
            .delete_all_for_user(record.user_id, Some(kind.into()))
            .await?;

        if record.is_expired(self.clock.now()) {
            info!(user_id = %record.user_id, kind = %kind, "expired action token presented");
            return Err(AuthError::Expired);
        }

        debug!(user_id = %record.user_id, kind = %kind, "consumed action token");
        Ok(record.user_id)
    }

    /// Same checks as [`Self::consume`] without deleting anything.
    ///
    /// # Errors
    /// `NotFound`, `Expired` or `Store`.
    pub async fn peek(&self, token: &str, kind: ActionKind) -> Result<Uuid> {
        let record = self
            .store
            .find(kind.into(), &hash_token(token))
            .await?
            .ok_or(AuthError::NotFound)?;

        if record.is_expired(self.clock.now()) {
            return Err(AuthError::Expired);
        }
        Ok(record.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::purge::purge_once;
    use crate::store::{MemoryTokenStore, PurgeSchedule, TokenStore};
    use crate::tokens::clock::ManualClock;
    use crate::tokens::random::OsSecureRandom;

    const NOW: i64 = 1_700_000_000;

    fn manager() -> (Arc<ManualClock>, Arc<MemoryTokenStore>, ActionTokenManager) {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(MemoryTokenStore::new());
        let manager = ActionTokenManager::new(
            store.clone(),
            clock.clone(),
            Arc::new(OsSecureRandom),
        )
        .with_ttl_seconds(ActionKind::PasswordReset, 600);
        (clock, store, manager)
    }

    #[tokio::test]
    async fn consume_is_single_use() -> anyhow::Result<()> {
        let (_clock, store, manager) = manager();
        let user = Uuid::new_v4();
        let token = manager.request(user, ActionKind::PasswordReset).await?;

        assert_eq!(manager.consume(&token, ActionKind::PasswordReset).await?, user);
        let again = manager.consume(&token, ActionKind::PasswordReset).await;
        assert!(matches!(again, Err(AuthError::NotFound)));
        assert!(store
            .find_live_for_user(user, TokenKind::PasswordReset, NOW)
            .await?
            .is_none());
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn second_request_is_rejected_and_first_still_works() -> anyhow::Result<()> {
        let (_clock, store, manager) = manager();
        let user = Uuid::new_v4();
        let first = manager.request(user, ActionKind::PasswordReset).await?;

        let second = manager.request(user, ActionKind::PasswordReset).await;
        assert!(matches!(second, Err(AuthError::AlreadyOutstanding)));
        let outstanding = store
            .find_live_for_user(user, TokenKind::PasswordReset, NOW)
            .await?;
        assert_eq!(outstanding.map(|r| r.token_hash), Some(hash_token(&first)));

        // another kind is independent
        manager.request(user, ActionKind::EmailVerification).await?;

        assert_eq!(manager.consume(&first, ActionKind::PasswordReset).await?, user);
        Ok(())
    }

    #[tokio::test]
    async fn expiry_is_strict_and_cleans_up() -> anyhow::Result<()> {
        let (clock, store, manager) = manager();
        let user = Uuid::new_v4();
        let token = manager.request(user, ActionKind::PasswordReset).await?;

        clock.advance(599);
        assert_eq!(manager.peek(&token, ActionKind::PasswordReset).await?, user);

        clock.advance(1);
        let peeked = manager.peek(&token, ActionKind::PasswordReset).await;
        assert!(matches!(peeked, Err(AuthError::Expired)));
        assert_eq!(store.len().await, 1);
        assert!(store
            .find_live_for_user(user, TokenKind::PasswordReset, NOW + 600)
            .await?
            .is_none());

        let consumed = manager.consume(&token, ActionKind::PasswordReset).await;
        assert!(matches!(consumed, Err(AuthError::Expired)));
        assert!(store.is_empty().await);

        manager.request(user, ActionKind::PasswordReset).await?;
        Ok(())
    }

    #[tokio::test]
    async fn purge_retention_keeps_expired_tokens_reportable() -> anyhow::Result<()> {
        let (clock, store, manager) = manager();
        let user = Uuid::new_v4();
        let token = manager.request(user, ActionKind::PasswordReset).await?;

        clock.advance(3600);
        purge_once(store.as_ref(), clock.as_ref(), &PurgeSchedule::default()).await?;

        let consumed = manager.consume(&token, ActionKind::PasswordReset).await;
        assert!(matches!(consumed, Err(AuthError::Expired)));
        Ok(())
    }

    #[tokio::test]
    async fn token_of_other_kind_is_not_found() -> anyhow::Result<()> {
        let (_clock, _store, manager) = manager();
        let user = Uuid::new_v4();
        let token = manager.request(user, ActionKind::EmailVerification).await?;

        let result = manager.consume(&token, ActionKind::PasswordReset).await;
        assert!(matches!(result, Err(AuthError::NotFound)));
        assert_eq!(manager.peek(&token, ActionKind::EmailVerification).await?, user);
        Ok(())
    }

    #[test]
    fn default_ttl_is_one_hour() {
        let manager = ActionTokenManager::new(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(ManualClock::new(NOW)),
            Arc::new(OsSecureRandom),
        );
        assert_eq!(manager.ttl_seconds(ActionKind::EmailVerification), 3600);
        assert_eq!(manager.ttl_seconds(ActionKind::PasswordReset), 3600);
    }
}
