use anyhow::bail;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_EMAIL_MASTER_KEY: &str = "email-master-key";

#[derive(Debug, Clone)]
pub struct Options {
    pub email_master_key: SecretString,
}

impl Options {
    /// Parse crypto arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the master key is missing or empty. Key length
    /// and encoding are validated when the codec is constructed.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let key = matches.get_one::<String>(ARG_EMAIL_MASTER_KEY).cloned();
        let key = match key {
            Some(value) if !value.trim().is_empty() => value,
            _ => bail!("missing required argument: --{ARG_EMAIL_MASTER_KEY}"),
        };

        Ok(Self {
            email_master_key: SecretString::from(key),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_EMAIL_MASTER_KEY)
            .long(ARG_EMAIL_MASTER_KEY)
            .help("Base64 master key for email hashing and encryption")
            .long_help(
                "Base64 master key for email hashing and encryption. Must decode to at least 32 bytes.\n\nTwo independent subkeys are derived from it, one for the deterministic lookup hash and one\nfor the stored ciphertext. Rotating the key invalidates every stored hash and ciphertext.",
            )
            .env("PRESENCE_EMAIL_MASTER_KEY")
            .hide_env_values(true),
    )
}
