//! Session facade: login, refresh, logout and the two action-token flows with
//! their user side effects.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use super::action::{ActionKind, ActionTokenManager};
use super::clock::{Clock, SystemClock};
use super::codec::{SessionClaims, SessionTokenCodec};
use super::config::TokenConfig;
use super::error::{AuthError, Result};
use super::password::{Argon2PasswordHasher, PasswordHasher};
use super::random::{OsSecureRandom, SecureRandom};
use super::rotation::{RefreshRotationEngine, TokenPair};
use crate::store::TokenStore;
use crate::users::UserDirectory;

/// A freshly requested action token together with where to deliver it.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

pub struct SessionService {
    config: TokenConfig,
    access: Arc<SessionTokenCodec>,
    engine: RefreshRotationEngine,
    actions: ActionTokenManager,
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    hasher: Arc<dyn PasswordHasher>,
}

pub struct SessionServiceBuilder {
    config: TokenConfig,
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn SecureRandom>,
    hasher: Arc<dyn PasswordHasher>,
}

impl SessionServiceBuilder {
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.random = random;
        self
    }

    #[must_use]
    pub fn with_password_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Validate the configuration and wire the codecs, engine and manager.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> anyhow::Result<SessionService> {
        self.config
            .validate()
            .context("invalid token configuration")?;

        let access = Arc::new(SessionTokenCodec::new(
            self.config.access_secret().clone(),
            self.config.access_ttl_seconds(),
            self.clock.clone(),
            self.random.clone(),
        ));
        let refresh = Arc::new(SessionTokenCodec::new(
            self.config.refresh_secret().clone(),
            self.config.refresh_ttl_seconds(),
            self.clock.clone(),
            self.random.clone(),
        ));
        let engine = RefreshRotationEngine::new(access.clone(), refresh, self.store.clone())
            .with_reuse_grace_seconds(self.config.refresh_reuse_grace_seconds());
        let actions = ActionTokenManager::new(self.store.clone(), self.clock, self.random)
            .with_ttl_seconds(
                ActionKind::PasswordReset,
                self.config.action_ttl_seconds(ActionKind::PasswordReset.into()),
            )
            .with_ttl_seconds(
                ActionKind::EmailVerification,
                self.config
                    .action_ttl_seconds(ActionKind::EmailVerification.into()),
            );

        Ok(SessionService {
            config: self.config,
            access,
            engine,
            actions,
            store: self.store,
            users: self.users,
            hasher: self.hasher,
        })
    }
}

impl SessionService {
    /// Start from the system clock, the OS RNG and Argon2id.
    #[must_use]
    pub fn builder(
        config: TokenConfig,
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
    ) -> SessionServiceBuilder {
        SessionServiceBuilder {
            config,
            store,
            users,
            clock: Arc::new(SystemClock),
            random: Arc::new(OsSecureRandom),
            hasher: Arc::new(Argon2PasswordHasher),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Issue a pair for a user whose credentials were already checked.
    ///
    /// # Errors
    /// `Internal` or `Store`.
    pub async fn login(&self, user_id: Uuid) -> Result<TokenPair> {
        let pair = self.engine.issue_pair(user_id).await?;
        info!(user_id = %user_id, "session started");
        Ok(pair)
    }

    /// Check an email/password pair through the user directory, then log in.
    /// Unknown emails and wrong passwords are both `Unauthorized`.
    ///
    /// # Errors
    /// `Unauthorized`, `Internal` or `Store`.
    pub async fn login_with_password(&self, email: &str, password: &str) -> Result<TokenPair> {
        let Some(user) = self.users.get_by_email(email).await? else {
            return Err(AuthError::Unauthorized);
        };
        if !self.hasher.verify(password, &user.password_hash) {
            return Err(AuthError::Unauthorized);
        }
        self.login(user.id).await
    }

    /// Rotate a refresh token.
    ///
    /// # Errors
    /// See [`RefreshRotationEngine::rotate`].
    pub async fn refresh(&self, presented: &str, claimed_user: Uuid) -> Result<TokenPair> {
        self.engine.rotate(presented, claimed_user).await
    }

    /// End the session. Never fails; store errors are logged.
    pub async fn logout(&self, user_id: Uuid, presented: Option<&str>) {
        if let Some(presented) = presented {
            self.end_refresh(presented).await;
        }
        match self.engine.revoke_all(user_id).await {
            Ok(revoked) => info!(user_id = %user_id, revoked, "session ended"),
            Err(err) => warn!(user_id = %user_id, "failed to revoke refresh tokens: {err}"),
        }
    }

    /// Revoke a single presented refresh token, if it is still stored. Never
    /// fails; store errors are logged.
    pub async fn end_refresh(&self, presented: &str) {
        match self.engine.revoke_one(presented).await {
            Ok(()) | Err(AuthError::NotFound) => {}
            Err(err) => warn!("failed to revoke refresh token: {err}"),
        }
    }

    /// Verify an access token.
    ///
    /// # Errors
    /// `Malformed`, `InvalidSignature` or `Expired`.
    pub fn authenticate(&self, access_token: &str) -> Result<SessionClaims> {
        self.access.verify(access_token)
    }

    /// Request an email verification token. `None` when the email is already
    /// verified.
    ///
    /// # Errors
    /// `NotFound` for an unknown user, `AlreadyOutstanding`, `Internal` or `Store`.
    pub async fn verify_email_request(&self, user_id: Uuid) -> Result<Option<ActionRequest>> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        if user.email_verified {
            return Ok(None);
        }
        let token = self
            .actions
            .request(user.id, ActionKind::EmailVerification)
            .await?;
        Ok(Some(ActionRequest {
            user_id: user.id,
            email: user.email,
            token,
        }))
    }

    /// Consume a verification token and mark the email verified.
    ///
    /// # Errors
    /// `NotFound`, `Expired` or `Store`.
    pub async fn verify_email_consume(&self, token: &str) -> Result<Uuid> {
        let user_id = self
            .actions
            .consume(token, ActionKind::EmailVerification)
            .await?;
        if !self.users.mark_email_verified(user_id).await? {
            return Err(AuthError::NotFound);
        }
        info!(user_id = %user_id, "email verified");
        Ok(user_id)
    }

    /// Request a reset token by email. `None` when no account has that email,
    /// so callers can answer the same way in both cases.
    ///
    /// # Errors
    /// `AlreadyOutstanding`, `Internal` or `Store`.
    pub async fn reset_password_request(&self, email: &str) -> Result<Option<ActionRequest>> {
        let Some(user) = self.users.get_by_email(email).await? else {
            return Ok(None);
        };
        let token = self
            .actions
            .request(user.id, ActionKind::PasswordReset)
            .await?;
        Ok(Some(ActionRequest {
            user_id: user.id,
            email: user.email,
            token,
        }))
    }

    /// Check a reset token without using it.
    ///
    /// # Errors
    /// `NotFound`, `Expired` or `Store`.
    pub async fn reset_password_peek(&self, token: &str) -> Result<Uuid> {
        self.actions.peek(token, ActionKind::PasswordReset).await
    }

    /// Consume a reset token, store the new password hash and revoke every
    /// refresh token of the user.
    ///
    /// # Errors
    /// `NotFound`, `Expired`, `Internal` or `Store`.
    pub async fn reset_password_consume(&self, token: &str, new_password: &str) -> Result<Uuid> {
        let hash = self.hasher.hash(new_password)?;
        let user_id = self
            .actions
            .consume(token, ActionKind::PasswordReset)
            .await?;
        if !self.users.set_password_hash(user_id, &hash).await? {
            return Err(AuthError::NotFound);
        }
        let revoked = self.engine.revoke_all(user_id).await?;
        info!(user_id = %user_id, revoked, "password reset");
        Ok(user_id)
    }
}
