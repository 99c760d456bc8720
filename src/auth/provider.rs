//! External identity collaborator.
//!
//! The OAuth exchange itself happens elsewhere; this module only turns a
//! bearer token into verified claims, either against the provider's
//! OIDC `userinfo` endpoint or from a fixed mapping in tests.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Mutex, time::Duration};

use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

/// Claims the provider vouches for after a successful exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

pub type ClaimsFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<IdentityClaims>>> + Send + 'a>>;

/// Resolves a bearer token into verified claims.
///
/// `Ok(None)` means the provider rejected the token; an `Err` means the
/// provider could not be consulted at all.
pub trait IdentityProvider: Send + Sync {
    fn verify<'a>(&'a self, token: &'a str) -> ClaimsFuture<'a>;
}

/// Provider backed by an OIDC `userinfo` endpoint.
pub struct OidcUserinfoProvider {
    client: Client,
    userinfo_url: Url,
}

impl OidcUserinfoProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(userinfo_url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build identity provider client")?;

        Ok(Self {
            client,
            userinfo_url,
        })
    }
}

impl IdentityProvider for OidcUserinfoProvider {
    fn verify<'a>(&'a self, token: &'a str) -> ClaimsFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.userinfo_url.clone())
                .bearer_auth(token)
                .send()
                .await
                .context("Identity provider request failed")?;

            match response.status() {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
                status if status.is_success() => {
                    let claims = response
                        .json::<IdentityClaims>()
                        .await
                        .context("Invalid identity provider response")?;
                    Ok(Some(claims))
                }
                status => bail!("Identity provider returned {status}"),
            }
        })
    }
}

/// Fixed token-to-claims mapping for tests and local development.
#[derive(Default)]
pub struct StaticIdentityProvider {
    claims: Mutex<HashMap<String, IdentityClaims>>,
}

impl StaticIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the claims returned for `token`.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, token: &str, claims: IdentityClaims) {
        self.claims
            .lock()
            .expect("claims lock poisoned")
            .insert(token.to_string(), claims);
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn verify<'a>(&'a self, token: &'a str) -> ClaimsFuture<'a> {
        let claims = self
            .claims
            .lock()
            .expect("claims lock poisoned")
            .get(token)
            .cloned();
        Box::pin(async move { Ok(claims) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_round_trip() -> Result<()> {
        let provider = StaticIdentityProvider::new();
        provider.insert(
            "token-a",
            IdentityClaims {
                email: "a@example.com".to_string(),
                name: Some("Alice".to_string()),
                email_verified: true,
            },
        );

        let claims = provider.verify("token-a").await?;
        assert_eq!(claims.map(|c| c.email), Some("a@example.com".to_string()));

        let missing = provider.verify("token-b").await?;
        assert!(missing.is_none());
        Ok(())
    }
}
