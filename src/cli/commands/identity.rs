use anyhow::bail;
use clap::{Arg, ArgMatches, Command};

pub const ARG_IDENTITY_USERINFO_URL: &str = "identity-userinfo-url";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub userinfo_url: String,
    pub frontend_base_url: String,
}

impl Options {
    /// Parse identity-provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let userinfo_url = matches
            .get_one::<String>(ARG_IDENTITY_USERINFO_URL)
            .cloned();
        let userinfo_url = match userinfo_url {
            Some(value) if !value.trim().is_empty() => value,
            _ => bail!("missing required argument: --{ARG_IDENTITY_USERINFO_URL}"),
        };

        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            userinfo_url,
            frontend_base_url,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDENTITY_USERINFO_URL)
                .long(ARG_IDENTITY_USERINFO_URL)
                .help("OIDC userinfo endpoint used to verify bearer tokens")
                .long_help(
                    "OIDC userinfo endpoint used to verify bearer tokens.\n\nEach request's bearer token is exchanged here for verified {email, name, email_verified}\nclaims; the OAuth flow itself happens in the frontend against the same provider.",
                )
                .env("PRESENCE_IDENTITY_USERINFO_URL"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed by CORS")
                .default_value("http://localhost:3000")
                .env("PRESENCE_FRONTEND_BASE_URL"),
        )
}
