//! The session record shared by both backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity provider that issued a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    /// Google OAuth; tokens are introspected with the issuer.
    Google,
    /// Email/password login against the web application.
    Password,
    /// Any other issuer tag, kept verbatim.
    Other(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Google => "google",
            Provider::Password => "password",
            Provider::Other(tag) => tag,
        }
    }
}

impl From<String> for Provider {
    fn from(tag: String) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "google" => Provider::Google,
            "password" | "email" => Provider::Password,
            _ => Provider::Other(tag),
        }
    }
}

impl From<&str> for Provider {
    fn from(tag: &str) -> Self {
        Provider::from(tag.to_string())
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_string()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated-principal record.
///
/// Timestamps are held at millisecond precision, the resolution both
/// backends persist, so a session read back compares equal to the one written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub provider: Provider,
    pub email: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Last write time. Only a tie-breaker between two valid copies.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session issued and updated at `now`.
    pub fn new(
        subject: impl Into<String>,
        access_token: impl Into<String>,
        provider: Provider,
        now: DateTime<Utc>,
    ) -> Self {
        let now = truncate_millis(now);
        Self {
            subject: subject.into(),
            access_token: access_token.into(),
            refresh_token: None,
            provider,
            email: None,
            issued_at: Some(now),
            expires_at: None,
            updated_at: now,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(truncate_millis(expires_at));
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = truncate_millis(updated_at);
        self
    }

    /// True when `expires_at` is set and not after `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Replace the credential after a refresh, stamping `updated_at`.
    pub fn refreshed(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: expires_at.map(truncate_millis),
            updated_at: truncate_millis(now),
            ..self.clone()
        }
    }
}

/// Drop sub-millisecond precision.
pub(crate) fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Both backends' sessions, read for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub local: Option<Session>,
    pub remote: Option<Session>,
}
