//! Header, cookie and input helpers shared by the auth handlers.

use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};
use regex::Regex;

use crate::tokens::TokenConfig;

pub const REFRESH_COOKIE_NAME: &str = "noteauth_refresh";
const REFRESH_COOKIE_PATH: &str = "/v1/auth";
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(super) fn valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
}

/// `HttpOnly` cookie carrying the refresh token, scoped to the auth routes.
pub(super) fn refresh_cookie(
    config: &TokenConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.refresh_ttl_seconds();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    // Only mark cookies secure when the frontend is served over HTTPS.
    if config.frontend_is_https() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_refresh_cookie(config: &TokenConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}=; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age=0"
    );
    if config.frontend_is_https() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == REFRESH_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(frontend: &str) -> TokenConfig {
        TokenConfig::new(
            SecretString::from("a".repeat(32)),
            SecretString::from("b".repeat(32)),
            frontend.to_string(),
        )
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("user@example.com"));
        assert!(!valid_email("user@"));
        assert!(!valid_email("no at@example.com"));
    }

    #[test]
    fn refresh_cookie_is_secure_only_over_https() -> anyhow::Result<()> {
        let cookie = refresh_cookie(&config("https://notes.dev"), "tok")?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with("noteauth_refresh=tok; Path=/v1/auth; HttpOnly; SameSite=Lax"));
        assert!(cookie.ends_with("; Secure"));

        let cookie = refresh_cookie(&config("http://localhost:5173"), "tok")?;
        assert!(!cookie.to_str()?.contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_expires_immediately() -> anyhow::Result<()> {
        let cookie = clear_refresh_cookie(&config("http://localhost"))?;
        assert!(cookie.to_str()?.contains("noteauth_refresh=; "));
        assert!(cookie.to_str()?.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn extract_refresh_token_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; noteauth_refresh=abc.def.ghi"),
        );
        assert_eq!(extract_refresh_token(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(COOKIE, HeaderValue::from_static("noteauth_refresh="));
        assert!(extract_refresh_token(&headers).is_none());
    }

    #[test]
    fn extract_bearer_token_accepts_lowercase_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert!(extract_bearer_token(&headers).is_none());
    }

    #[test]
    fn password_length_counts_chars() {
        assert!(valid_password("ññññññññ"));
        assert!(!valid_password("short"));
    }
}
