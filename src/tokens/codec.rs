//! Compact signed session tokens (`header.claims.signature`, HS256).
//!
//! Access and refresh tokens share this codec; each is configured with its own
//! secret and TTL so one can never be presented as the other.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::clock::Clock;
use super::error::{AuthError, Result};
use super::random::SecureRandom;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: SessionClaims,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)
        .map_err(|err| AuthError::Internal(format!("failed to encode token: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}

pub struct SessionTokenCodec {
    secret: SecretString,
    ttl_seconds: i64,
    clock: Arc<dyn Clock>,
    random: Arc<dyn SecureRandom>,
}

impl SessionTokenCodec {
    pub fn new(
        secret: SecretString,
        ttl_seconds: i64,
        clock: Arc<dyn Clock>,
        random: Arc<dyn SecureRandom>,
    ) -> Self {
        Self {
            secret,
            ttl_seconds,
            clock,
            random,
        }
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Sign `{sub, iat = now, exp = now + ttl}` for `subject`.
    ///
    /// # Errors
    /// Returns an error if `ttl_seconds` is not positive or signing fails.
    pub fn issue(&self, subject: &str, ttl_seconds: i64) -> Result<SignedToken> {
        if ttl_seconds <= 0 {
            return Err(AuthError::Internal(
                "token ttl must be positive".to_string(),
            ));
        }
        if subject.is_empty() {
            return Err(AuthError::Malformed);
        }

        let iat = self.clock.now();
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat,
            exp: iat.saturating_add(ttl_seconds),
            jti: self.random.token()?,
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(SignedToken {
            token: format!("{signing_input}.{signature_b64}"),
            claims,
        })
    }

    /// Issue with the TTL this codec was configured with.
    ///
    /// # Errors
    /// Same as [`Self::issue`].
    pub fn issue_default(&self, subject: &str) -> Result<SignedToken> {
        self.issue(subject, self.ttl_seconds)
    }

    /// Check signature and expiry and return the claims.
    ///
    /// A token whose `exp` equals the current second is already expired.
    ///
    /// # Errors
    /// `Malformed`, `InvalidSignature` or `Expired`.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let claims = self.inspect(token)?;
        if self.is_expired(&claims) {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// Check the signature only; expiry is left to the caller.
    ///
    /// # Errors
    /// `Malformed` or `InvalidSignature`.
    pub fn inspect(&self, token: &str) -> Result<SessionClaims> {
        let mut parts = token.trim().split('.');
        let header_b64 = parts.next().ok_or(AuthError::Malformed)?;
        let claims_b64 = parts.next().ok_or(AuthError::Malformed)?;
        let sig_b64 = parts.next().ok_or(AuthError::Malformed)?;
        if parts.next().is_some() {
            return Err(AuthError::Malformed);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::Malformed);
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| AuthError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if claims.sub.is_empty() || claims.exp <= claims.iat {
            return Err(AuthError::Malformed);
        }
        Ok(claims)
    }

    #[must_use]
    pub fn is_expired(&self, claims: &SessionClaims) -> bool {
        self.now() >= claims.exp
    }

    /// Current time of the clock this codec signs with.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|err| AuthError::Internal(format!("invalid signing key: {err}")))
    }
}
