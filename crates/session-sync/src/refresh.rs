//! Access-token refresh against the issuer's token endpoint.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use sync_config_and_utils::Config;
use tracing::{debug, info, warn};
use url::Url;

/// Tokens returned by a successful refresh grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Present when the issuer rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the new access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedTokens>;
}

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Refresh with exponential backoff on transient errors.
///
/// A non-transient error is returned at once. When every attempt fails
/// transiently the result is [`AuthError::RefreshExhausted`].
pub async fn refresh_with_backoff(
    refresher: &dyn TokenRefresher,
    config: &RefreshConfig,
    refresh_token: &str,
) -> AuthResult<RefreshedTokens> {
    for attempt in 0..config.max_retries {
        match refresher.refresh(refresh_token).await {
            Ok(tokens) => return Ok(tokens),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_retries {
                    let delay = config.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Refresh failed with transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                warn!("Refresh failed with non-transient error: {}", e);
                return Err(e);
            }
        }
    }

    warn!("Refresh failed after {} attempts", config.max_retries);
    Err(AuthError::RefreshExhausted(config.max_retries))
}

/// OAuth 2.0 `refresh_token` grant.
#[derive(Debug, Clone)]
pub struct OAuthRefresher {
    http_client: reqwest::Client,
    token_url: Url,
    client_id: Option<String>,
}

impl OAuthRefresher {
    pub fn new(token_url: Url, client_id: Option<String>, timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            token_url,
            client_id,
        })
    }

    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let token_url = Url::parse(&config.token_url)?;
        Self::new(
            token_url,
            config.client_id.clone(),
            config.introspection_timeout(),
        )
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedTokens> {
        debug!(url = %self.token_url, "Refreshing token");

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(client_id) = &self.client_id {
            form.push(("client_id", client_id.as_str()));
        }

        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            warn!(status = %status, "Token endpoint unavailable");
            return Err(AuthError::IssuerUnavailable(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Token refresh failed");
            return Err(AuthError::TokenRefresh(format!("HTTP {}: {}", status, body)));
        }

        let tokens: RefreshedTokens = response.json().await?;
        if tokens.access_token.is_empty() {
            return Err(AuthError::TokenRefresh(
                "token endpoint returned an empty access token".to_string(),
            ));
        }
        info!(rotated = tokens.refresh_token.is_some(), "Token refreshed successfully");
        Ok(tokens)
    }
}
