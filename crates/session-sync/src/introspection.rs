//! Issuer-side token introspection.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use sync_config_and_utils::Config;
use tracing::{debug, warn};
use url::Url;

/// What the issuer says about a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    /// Explicitly rejected: revoked, expired at the issuer, or never issued.
    Revoked,
}

/// Asks a token's issuer whether it is still live.
///
/// Return `Err` for anything short of a definite answer; callers treat
/// errors as "unknown" rather than as a rejection.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    async fn introspect(&self, access_token: &str) -> AuthResult<TokenStatus>;
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Google's `tokeninfo` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTokenInfo {
    http_client: reqwest::Client,
    url: Url,
}

impl GoogleTokenInfo {
    pub fn new(url: Url, timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, url })
    }

    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let url = Url::parse(&config.introspection_url)?;
        Self::new(url, config.introspection_timeout())
    }
}

#[async_trait]
impl TokenIntrospector for GoogleTokenInfo {
    async fn introspect(&self, access_token: &str) -> AuthResult<TokenStatus> {
        debug!(url = %self.url, "Introspecting token with issuer");

        let response = self
            .http_client
            .get(self.url.clone())
            .query(&[("access_token", access_token)])
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            warn!(status = %status, "Issuer unavailable");
            return Err(AuthError::IssuerUnavailable(status.as_u16()));
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<TokenInfoResponse>(&body).ok();

        if let Some(TokenInfoResponse {
            error: Some(error),
            error_description,
        }) = parsed
        {
            debug!(error = %error, description = ?error_description, "Issuer rejected token");
            return Ok(TokenStatus::Revoked);
        }

        match status.as_u16() {
            200..=299 => Ok(TokenStatus::Active),
            400 | 401 | 403 => {
                debug!(status = %status, "Issuer rejected token");
                Ok(TokenStatus::Revoked)
            }
            _ => Err(AuthError::SessionInvalid(format!(
                "unexpected introspection response: HTTP {}",
                status
            ))),
        }
    }
}
