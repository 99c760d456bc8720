use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::{api, auth::OidcUserinfoProvider, crypto::EmailCodec};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub email_master_key: SecretString,
    pub identity_userinfo_url: String,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the master key or userinfo URL is invalid, or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let codec = EmailCodec::new(args.email_master_key.expose_secret())
        .context("Invalid --email-master-key")?;

    let userinfo_url = Url::parse(&args.identity_userinfo_url).with_context(|| {
        format!(
            "Invalid --identity-userinfo-url: {}",
            args.identity_userinfo_url
        )
    })?;
    let identity = OidcUserinfoProvider::new(userinfo_url)?;

    api::new(
        args.port,
        &args.dsn,
        &args.frontend_base_url,
        Arc::new(codec),
        Arc::new(identity),
    )
    .await
}
