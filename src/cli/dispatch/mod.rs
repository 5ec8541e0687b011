//! Maps validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{tokens, ARG_DEV_USER, ARG_DSN, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>(ARG_DSN).cloned();
    let dev_user = matches.get_one::<String>(ARG_DEV_USER).cloned();

    let tokens = tokens::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        dev_user,
        tokens,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action_from_env() {
        temp_env::with_vars(
            [
                ("NOTEAUTH_PORT", Some("9999")),
                ("NOTEAUTH_DSN", None),
                ("NOTEAUTH_DEV_USER", Some("dev@example.com:correct horse")),
                (
                    "NOTEAUTH_ACCESS_TOKEN_SECRET",
                    Some("access-secret-access-secret-access-secret"),
                ),
                (
                    "NOTEAUTH_REFRESH_TOKEN_SECRET",
                    Some("refresh-secret-refresh-secret-refresh-secret"),
                ),
                ("NOTEAUTH_REFRESH_TOKEN_TTL_SECONDS", Some("120")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["noteauth"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9999);
                    assert!(args.dsn.is_none());
                    assert_eq!(
                        args.dev_user.as_deref(),
                        Some("dev@example.com:correct horse")
                    );
                    assert_eq!(args.tokens.refresh_ttl_seconds, 120);
                    assert_eq!(
                        args.tokens.access_token_secret.expose_secret(),
                        "access-secret-access-secret-access-secret"
                    );
                    assert_eq!(args.tokens.purge_interval_seconds, 300);
                    assert_eq!(args.tokens.refresh_reuse_grace_seconds, 5);
                    assert_eq!(
                        args.tokens.purge_schedule().retention,
                        std::time::Duration::from_secs(86_400)
                    );
                }
            },
        );
    }
}
