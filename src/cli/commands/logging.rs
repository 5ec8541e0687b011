//! `-v` flags and `NOTEAUTH_LOG_LEVEL`, both resolved to a `tracing::Level`.

use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Levels in `-v` order: no flag logs errors only, each `-v` adds one step.
const LEVELS: [Level; 5] = [
    Level::ERROR,
    Level::WARN,
    Level::INFO,
    Level::DEBUG,
    Level::TRACE,
];

/// Accept a level name (any case) or a step count and store it as a `-v` count.
fn parse_level(value: &str) -> Result<u8, String> {
    let step = match value.parse::<usize>() {
        Ok(step) => Some(step).filter(|step| *step < LEVELS.len()),
        Err(_) => LEVELS
            .iter()
            .position(|level| level.as_str().eq_ignore_ascii_case(value.trim())),
    };
    step.and_then(|step| u8::try_from(step).ok())
        .ok_or_else(|| format!("invalid log level: {value}"))
}

/// The level selected on the command line or through the environment.
#[must_use]
pub fn level(matches: &ArgMatches) -> Level {
    let step = matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0);
    LEVELS[usize::from(step).min(LEVELS.len() - 1)]
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("NOTEAUTH_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(ValueParser::from(parse_level)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_accepts_names_and_steps() {
        assert_eq!(parse_level("error"), Ok(0));
        assert_eq!(parse_level("WARN"), Ok(1));
        assert_eq!(parse_level("Info"), Ok(2));
        assert_eq!(parse_level("trace"), Ok(4));
        assert_eq!(parse_level("3"), Ok(3));
        assert!(parse_level("5").is_err());
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn level_follows_flag_count() {
        for (args, expected) in [
            (vec!["noteauth"], Level::ERROR),
            (vec!["noteauth", "-v"], Level::WARN),
            (vec!["noteauth", "-vv"], Level::INFO),
            (vec!["noteauth", "-vvv"], Level::DEBUG),
            (vec!["noteauth", "-vvvvvv"], Level::TRACE),
        ] {
            temp_env::with_var("NOTEAUTH_LOG_LEVEL", None::<&str>, || {
                let matches = with_args(Command::new("noteauth")).get_matches_from(args);
                assert_eq!(level(&matches), expected);
            });
        }
    }
}
