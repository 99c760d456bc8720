//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{crypto, identity};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let crypto_opts = crypto::Options::parse(matches)?;
    let identity_opts = identity::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        email_master_key: crypto_opts.email_master_key,
        identity_userinfo_url: identity_opts.userinfo_url,
        frontend_base_url: identity_opts.frontend_base_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_master_key_required() {
        temp_env::with_vars(
            [
                ("PRESENCE_EMAIL_MASTER_KEY", None::<&str>),
                (
                    "PRESENCE_DSN",
                    Some("postgres://user@localhost:5432/presence"),
                ),
                (
                    "PRESENCE_IDENTITY_USERINFO_URL",
                    Some("https://id.example.com/oauth2/userinfo"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["presence"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --email-master-key")
                    );
                }
            },
        );
    }

    #[test]
    fn identity_userinfo_url_required() {
        temp_env::with_vars(
            [
                (
                    "PRESENCE_EMAIL_MASTER_KEY",
                    Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
                ),
                (
                    "PRESENCE_DSN",
                    Some("postgres://user@localhost:5432/presence"),
                ),
                ("PRESENCE_IDENTITY_USERINFO_URL", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["presence"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --identity-userinfo-url")
                    );
                }
            },
        );
    }

    #[test]
    fn server_action_from_full_args() {
        temp_env::with_vars(
            [
                (
                    "PRESENCE_EMAIL_MASTER_KEY",
                    Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
                ),
                (
                    "PRESENCE_DSN",
                    Some("postgres://user@localhost:5432/presence"),
                ),
                (
                    "PRESENCE_IDENTITY_USERINFO_URL",
                    Some("https://id.example.com/oauth2/userinfo"),
                ),
                ("PRESENCE_FRONTEND_BASE_URL", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["presence", "--port", "9000"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9000);
                    assert_eq!(args.dsn, "postgres://user@localhost:5432/presence");
                    assert_eq!(
                        args.identity_userinfo_url,
                        "https://id.example.com/oauth2/userinfo"
                    );
                    assert_eq!(args.frontend_base_url, "http://localhost:3000");
                }
            },
        );
    }
}
