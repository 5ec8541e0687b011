//! Refresh token rotation with reuse detection.
//!
//! A refresh token is valid only while its signature verifies, it has not
//! expired, and its digest is still in the store. Rotation swaps the stored
//! digest for the successor's in one atomic `replace`; presenting a token whose
//! digest is gone means it was already rotated (or logged out), so the whole
//! refresh family of the user is revoked.
//!
//! The one exception is a replay that lands within the reuse grace of the
//! rotation that removed the token. That is two requests racing with the same
//! token: the loser still gets `ReuseDetected`, but the winner's successor stays.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::{SessionClaims, SessionTokenCodec, SignedToken};
use super::error::{AuthError, Result};
use super::random::hash_token;
use crate::store::{RotationMark, TokenKind, TokenRecord, TokenStore};

/// Access and refresh token handed to the client after login or rotation.
#[derive(Clone)]
pub struct TokenPair {
    pub user_id: Uuid,
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("user_id", &self.user_id)
            .field("access_token", &"[redacted]")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &"[redacted]")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

pub struct RefreshRotationEngine {
    access: Arc<SessionTokenCodec>,
    refresh: Arc<SessionTokenCodec>,
    store: Arc<dyn TokenStore>,
    reuse_grace_seconds: i64,
}

fn subject_of(claims: &SessionClaims) -> Result<Uuid> {
    Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Malformed)
}

impl RefreshRotationEngine {
    #[must_use]
    pub fn new(
        access: Arc<SessionTokenCodec>,
        refresh: Arc<SessionTokenCodec>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            access,
            refresh,
            store,
            reuse_grace_seconds: 0,
        }
    }

    /// Replays within `seconds` of the rotation that consumed the token keep that
    /// rotation's successor alive.
    #[must_use]
    pub fn with_reuse_grace_seconds(mut self, seconds: i64) -> Self {
        self.reuse_grace_seconds = seconds.max(0);
        self
    }

    fn mint_refresh(&self, user_id: Uuid) -> Result<(SignedToken, TokenRecord)> {
        let signed = self.refresh.issue_default(&user_id.to_string())?;
        let record = TokenRecord::new(
            TokenKind::Refresh,
            hash_token(&signed.token),
            user_id,
            signed.claims.iat,
            signed.claims.exp,
        );
        Ok((signed, record))
    }

    /// Issue a refresh token for `user_id` and persist its record. Earlier
    /// records of the user are left alone.
    ///
    /// # Errors
    /// `Internal` if signing fails, `Store` if the record cannot be written.
    pub async fn issue(&self, user_id: Uuid) -> Result<(SignedToken, TokenRecord)> {
        let (signed, record) = self.mint_refresh(user_id)?;
        self.store.put(record.clone()).await?;
        debug!(user_id = %user_id, record_id = %record.id, "issued refresh token");
        Ok((signed, record))
    }

    /// Issue a fresh access token and refresh token.
    ///
    /// # Errors
    /// Same as [`Self::issue`].
    pub async fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair> {
        let access = self.access.issue_default(&user_id.to_string())?;
        let (refresh, _) = self.issue(user_id).await?;
        Ok(TokenPair {
            user_id,
            access_token: access.token,
            access_expires_at: access.claims.exp,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.claims.exp,
        })
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The presented token must be signed for `claimed_user`; a token for
    /// someone else is `Unauthorized` and touches nothing. An expired token or a
    /// token no longer in the store revokes every refresh record of
    /// `claimed_user` before the failure is returned, unless the token was rotated
    /// away less than the reuse grace ago.
    ///
    /// # Errors
    /// `Malformed`, `InvalidSignature`, `Unauthorized`, `Expired`,
    /// `ReuseDetected`, `Store` or `Internal`.
    pub async fn rotate(&self, presented: &str, claimed_user: Uuid) -> Result<TokenPair> {
        let claims = self.refresh.inspect(presented)?;
        let subject = subject_of(&claims)?;
        if subject != claimed_user {
            warn!(
                user_id = %claimed_user,
                "refresh token presented for a different user"
            );
            return Err(AuthError::Unauthorized);
        }

        if self.refresh.is_expired(&claims) {
            let revoked = self.revoke_all(claimed_user).await?;
            info!(user_id = %claimed_user, revoked, "expired refresh token; session revoked");
            return Err(AuthError::Expired);
        }

        let access = self.access.issue_default(&claimed_user.to_string())?;
        let (successor, record) = self.mint_refresh(claimed_user)?;
        let successor_hash = record.token_hash.clone();
        let presented_hash = hash_token(presented);

        let old = self
            .store
            .replace(TokenKind::Refresh, &presented_hash, record)
            .await?;

        match old {
            None => {
                if let Some(mark) = self.recent_rotation(&presented_hash, claimed_user).await? {
                    warn!(
                        user_id = %claimed_user,
                        jti = %claims.jti,
                        rotated_at = mark.rotated_at,
                        "refresh token replayed during its reuse grace; successor kept"
                    );
                    return Err(AuthError::ReuseDetected);
                }
                let revoked = self.revoke_all(claimed_user).await?;
                warn!(
                    user_id = %claimed_user,
                    jti = %claims.jti,
                    revoked,
                    "refresh token reuse detected; session family revoked"
                );
                Err(AuthError::ReuseDetected)
            }
            Some(old) if old.user_id != claimed_user => {
                // Undo the swap: the stored owner keeps its record.
                self.store
                    .take(TokenKind::Refresh, &successor_hash)
                    .await?;
                self.store.put(old).await?;
                warn!(user_id = %claimed_user, "refresh record owned by a different user");
                Err(AuthError::Unauthorized)
            }
            Some(old) => {
                debug!(
                    user_id = %claimed_user,
                    rotated = %old.id,
                    "rotated refresh token"
                );
                Ok(TokenPair {
                    user_id: claimed_user,
                    access_token: access.token,
                    access_expires_at: access.claims.exp,
                    refresh_token: successor.token,
                    refresh_expires_at: successor.claims.exp,
                })
            }
        }
    }

    /// The rotation that consumed `presented_hash`, if it belongs to `user_id` and
    /// happened less than the reuse grace ago.
    async fn recent_rotation(
        &self,
        presented_hash: &[u8],
        user_id: Uuid,
    ) -> Result<Option<RotationMark>> {
        if self.reuse_grace_seconds == 0 {
            return Ok(None);
        }
        let mark = self
            .store
            .find_rotation(TokenKind::Refresh, presented_hash)
            .await?;
        let now = self.refresh.now();
        Ok(mark.filter(|mark| {
            mark.user_id == user_id && now - mark.rotated_at < self.reuse_grace_seconds
        }))
    }

    /// Delete every refresh record of the user.
    ///
    /// # Errors
    /// `Store` on backend failure.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64> {
        Ok(self
            .store
            .delete_all_for_user(user_id, Some(TokenKind::Refresh))
            .await?)
    }

    /// Delete the record of one presented refresh token.
    ///
    /// # Errors
    /// `NotFound` if it was already gone, `Store` on backend failure.
    pub async fn revoke_one(&self, presented: &str) -> Result<()> {
        self.store
            .take(TokenKind::Refresh, &hash_token(presented))
            .await?
            .map(|_| ())
            .ok_or(AuthError::NotFound)
    }
}
