use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use crate::store::{PurgeSchedule, DEFAULT_PURGE_INTERVAL, DEFAULT_PURGE_RETENTION};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_PASSWORD_RESET_TTL: &str = "password-reset-ttl-seconds";
pub const ARG_EMAIL_VERIFICATION_TTL: &str = "email-verification-ttl-seconds";
pub const ARG_REFRESH_REUSE_GRACE: &str = "refresh-reuse-grace-seconds";
pub const ARG_PURGE_INTERVAL: &str = "purge-interval-seconds";
pub const ARG_PURGE_RETENTION: &str = "purge-retention-seconds";

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub password_reset_ttl_seconds: i64,
    pub email_verification_ttl_seconds: i64,
    pub refresh_reuse_grace_seconds: i64,
    pub purge_interval_seconds: u64,
    pub purge_retention_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = |name: &str| -> Result<SecretString> {
            matches
                .get_one::<String>(name)
                .cloned()
                .map(SecretString::from)
                .with_context(|| format!("missing required argument: --{name}"))
        };
        let number = |name: &str| -> Result<i64> {
            matches
                .get_one::<i64>(name)
                .copied()
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            access_token_secret: secret(ARG_ACCESS_TOKEN_SECRET)?,
            refresh_token_secret: secret(ARG_REFRESH_TOKEN_SECRET)?,
            access_ttl_seconds: number(ARG_ACCESS_TTL)?,
            refresh_ttl_seconds: number(ARG_REFRESH_TTL)?,
            password_reset_ttl_seconds: number(ARG_PASSWORD_RESET_TTL)?,
            email_verification_ttl_seconds: number(ARG_EMAIL_VERIFICATION_TTL)?,
            refresh_reuse_grace_seconds: number(ARG_REFRESH_REUSE_GRACE)?,
            purge_interval_seconds: matches
                .get_one::<u64>(ARG_PURGE_INTERVAL)
                .copied()
                .unwrap_or(DEFAULT_PURGE_INTERVAL.as_secs()),
            purge_retention_seconds: matches
                .get_one::<u64>(ARG_PURGE_RETENTION)
                .copied()
                .unwrap_or(DEFAULT_PURGE_RETENTION.as_secs()),
        })
    }

    #[must_use]
    pub fn purge_schedule(&self) -> PurgeSchedule {
        PurgeSchedule {
            interval: Duration::from_secs(self.purge_interval_seconds),
            retention: Duration::from_secs(self.purge_retention_seconds),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    with_ttl_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for email links and CORS")
                .env("NOTEAUTH_FRONTEND_BASE_URL")
                .default_value("http://localhost:5173"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HMAC secret for access tokens (at least 32 bytes)")
                .env("NOTEAUTH_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HMAC secret for refresh tokens (at least 32 bytes)")
                .env("NOTEAUTH_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token TTL in seconds")
                .env("NOTEAUTH_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token TTL in seconds")
                .env("NOTEAUTH_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_RESET_TTL)
                .long(ARG_PASSWORD_RESET_TTL)
                .help("Password reset link TTL in seconds")
                .env("NOTEAUTH_PASSWORD_RESET_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_EMAIL_VERIFICATION_TTL)
                .long(ARG_EMAIL_VERIFICATION_TTL)
                .help("Email verification link TTL in seconds")
                .env("NOTEAUTH_EMAIL_VERIFICATION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_REUSE_GRACE)
                .long(ARG_REFRESH_REUSE_GRACE)
                .help("Seconds after a rotation in which a replayed refresh token keeps its successor (0 disables)")
                .env("NOTEAUTH_REFRESH_REUSE_GRACE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new(ARG_PURGE_INTERVAL)
                .long(ARG_PURGE_INTERVAL)
                .help("Interval between expired-token purges in seconds")
                .env("NOTEAUTH_PURGE_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PURGE_RETENTION)
                .long(ARG_PURGE_RETENTION)
                .help("Seconds an expired token is kept before it is purged")
                .env("NOTEAUTH_PURGE_RETENTION_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
}
