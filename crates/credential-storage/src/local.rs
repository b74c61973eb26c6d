//! Local backend encoding: tokens as plain entries, the rest as a JSON blob.

use crate::session::Session;
use crate::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session metadata stored under [`crate::StorageKeys::SESSION_META`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LocalSessionMeta {
    pub subject: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl LocalSessionMeta {
    pub fn from_session(session: &Session) -> Self {
        Self {
            subject: session.subject.clone(),
            provider: session.provider.clone(),
            email: session.email.clone(),
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            updated_at: session.updated_at,
        }
    }

    pub fn into_session(self, access_token: String, refresh_token: Option<String>) -> Session {
        Session {
            subject: self.subject,
            access_token,
            refresh_token,
            provider: self.provider,
            email: self.email,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            updated_at: self.updated_at,
        }
    }
}
