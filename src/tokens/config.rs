//! Token lifetimes, signing secrets and link building.

use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::store::TokenKind;

pub const MIN_SECRET_BYTES: usize = 32;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_PASSWORD_RESET_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_EMAIL_VERIFICATION_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_REFRESH_REUSE_GRACE_SECONDS: i64 = 5;

#[derive(Clone, Debug)]
pub struct TokenConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    frontend_base_url: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    password_reset_ttl_seconds: i64,
    email_verification_ttl_seconds: i64,
    refresh_reuse_grace_seconds: i64,
}

impl TokenConfig {
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        frontend_base_url: String,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            frontend_base_url,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            password_reset_ttl_seconds: DEFAULT_PASSWORD_RESET_TTL_SECONDS,
            email_verification_ttl_seconds: DEFAULT_EMAIL_VERIFICATION_TTL_SECONDS,
            refresh_reuse_grace_seconds: DEFAULT_REFRESH_REUSE_GRACE_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.password_reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_verification_ttl_seconds = seconds;
        self
    }

    /// How long after a rotation a replay of the rotated token is treated as a
    /// concurrent refresh that lost the race. `0` revokes on every replay.
    #[must_use]
    pub fn with_refresh_reuse_grace_seconds(mut self, seconds: i64) -> Self {
        self.refresh_reuse_grace_seconds = seconds;
        self
    }

    /// Check secrets, TTLs and the frontend URL before anything is built on top.
    ///
    /// # Errors
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        for (name, secret) in [
            ("access token secret", &self.access_secret),
            ("refresh token secret", &self.refresh_secret),
        ] {
            if secret.expose_secret().len() < MIN_SECRET_BYTES {
                return Err(anyhow!(
                    "{name} must be at least {MIN_SECRET_BYTES} bytes"
                ));
            }
        }

        if self.access_secret.expose_secret() == self.refresh_secret.expose_secret() {
            return Err(anyhow!("access and refresh token secrets must differ"));
        }

        for (name, ttl) in [
            ("access token TTL", self.access_ttl_seconds),
            ("refresh token TTL", self.refresh_ttl_seconds),
            ("password reset TTL", self.password_reset_ttl_seconds),
            ("email verification TTL", self.email_verification_ttl_seconds),
        ] {
            if ttl <= 0 {
                return Err(anyhow!("{name} must be positive"));
            }
        }

        if self.refresh_reuse_grace_seconds < 0
            || self.refresh_reuse_grace_seconds >= self.refresh_ttl_seconds
        {
            return Err(anyhow!(
                "refresh reuse grace must be between 0 and the refresh token TTL"
            ));
        }

        let url = Url::parse(&self.frontend_base_url)
            .with_context(|| format!("invalid frontend base URL: {}", self.frontend_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("frontend base URL must be http or https"));
        }
        Ok(())
    }

    pub(crate) fn access_secret(&self) -> &SecretString {
        &self.access_secret
    }

    pub(crate) fn refresh_secret(&self) -> &SecretString {
        &self.refresh_secret
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn refresh_reuse_grace_seconds(&self) -> i64 {
        self.refresh_reuse_grace_seconds
    }

    /// TTL for a single-use action token kind.
    #[must_use]
    pub fn action_ttl_seconds(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::PasswordReset => self.password_reset_ttl_seconds,
            TokenKind::EmailVerification => self.email_verification_ttl_seconds,
            TokenKind::Refresh => self.refresh_ttl_seconds,
        }
    }

    /// Whether cookies should carry `Secure`.
    #[must_use]
    pub fn frontend_is_https(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }

    /// The frontend origin used for CORS (scheme, host and port only).
    #[must_use]
    pub fn frontend_origin(&self) -> Option<String> {
        Url::parse(&self.frontend_base_url)
            .ok()
            .map(|url| url.origin().ascii_serialization())
            .filter(|origin| origin != "null")
    }

    #[must_use]
    pub fn build_verify_url(&self, token: &str) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        format!("{base}/verify-email#token={token}")
    }

    #[must_use]
    pub fn build_reset_url(&self, token: &str) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        format!("{base}/reset-password#token={token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(fill: char) -> SecretString {
        SecretString::from(fill.to_string().repeat(MIN_SECRET_BYTES))
    }

    fn config() -> TokenConfig {
        TokenConfig::new(secret('a'), secret('b'), "https://notes.dev/".to_string())
    }

    #[test]
    fn defaults_match_documented_lifetimes() {
        let config = config();
        assert_eq!(config.access_ttl_seconds(), 900);
        assert_eq!(config.refresh_ttl_seconds(), 604_800);
        assert_eq!(config.action_ttl_seconds(TokenKind::PasswordReset), 3600);
        assert_eq!(config.action_ttl_seconds(TokenKind::EmailVerification), 3600);
        assert_eq!(config.refresh_reuse_grace_seconds(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_secret() {
        let config = TokenConfig::new(
            SecretString::from("short".to_string()),
            secret('b'),
            "https://notes.dev".to_string(),
        );
        let err = config.validate().err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("access token secret must be at least 32 bytes")
        );
    }

    #[test]
    fn validate_rejects_shared_secret() {
        let config = TokenConfig::new(secret('a'), secret('a'), "https://notes.dev".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_ttl() {
        let config = config().with_password_reset_ttl_seconds(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_bounds_reuse_grace() {
        assert!(config().with_refresh_reuse_grace_seconds(0).validate().is_ok());
        assert!(config().with_refresh_reuse_grace_seconds(-1).validate().is_err());
        let config = config()
            .with_refresh_ttl_seconds(60)
            .with_refresh_reuse_grace_seconds(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let config = TokenConfig::new(secret('a'), secret('b'), "notes.dev".to_string());
        assert!(config.validate().is_err());
        let config = TokenConfig::new(secret('a'), secret('b'), "ftp://notes.dev".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn links_trim_trailing_slash() {
        let config = config();
        assert_eq!(
            config.build_verify_url("abc"),
            "https://notes.dev/verify-email#token=abc"
        );
        assert_eq!(
            config.build_reset_url("abc"),
            "https://notes.dev/reset-password#token=abc"
        );
    }

    #[test]
    fn origin_drops_path() {
        let config = TokenConfig::new(
            secret('a'),
            secret('b'),
            "http://localhost:5173/app/".to_string(),
        );
        assert_eq!(
            config.frontend_origin().as_deref(),
            Some("http://localhost:5173")
        );
        assert!(!config.frontend_is_https());
    }
}
