//! High-level API for reading and writing sessions against both backends.

use crate::cookies::{decode_session, CookiePolicy, RemoteCookies};
use crate::keys::{CookieNames, StorageKeys};
use crate::local::LocalSessionMeta;
use crate::{CookieBackend, CredentialSnapshot, LocalStorage, Session, StorageError, StorageResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Which copy of the session an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Local,
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::Remote => f.write_str("remote"),
        }
    }
}

/// Broadcast whenever a write changes who (if anyone) a backend holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChanged {
    pub backend: Backend,
    pub authenticated: bool,
    pub subject: Option<String>,
}

/// Result of a total write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Session stored
    Written,
    /// Every entry removed
    Cleared,
    /// Backend fault; the backend holds no session or a pre-existing one
    Failed,
}

impl WriteOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, WriteOutcome::Failed)
    }
}

/// Reads and writes a [`Session`] against the local and remote backends.
///
/// No operation returns an error: a faulty backend or malformed data reads
/// as "no session" and fails writes with [`WriteOutcome::Failed`].
pub struct CredentialStore {
    local: Arc<dyn LocalStorage>,
    cookies: Arc<dyn CookieBackend>,
    policy: CookiePolicy,
    events: broadcast::Sender<AuthStateChanged>,
}

impl CredentialStore {
    pub fn new(
        local: Arc<dyn LocalStorage>,
        cookies: Arc<dyn CookieBackend>,
        policy: CookiePolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            local,
            cookies,
            policy,
            events,
        }
    }

    /// Receive [`AuthStateChanged`] notifications for subsequent writes.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthStateChanged> {
        self.events.subscribe()
    }

    // ==========================================
    // Local backend
    // ==========================================

    pub async fn read_local(&self) -> Option<Session> {
        match self.try_read_local().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "Local session unreadable, treating as absent");
                None
            }
        }
    }

    async fn try_read_local(&self) -> StorageResult<Option<Session>> {
        let Some(access_token) = self.local.get(StorageKeys::ACCESS_TOKEN).await? else {
            return Ok(None);
        };
        if access_token.is_empty() {
            return Ok(None);
        }
        let Some(meta) = self.local.get(StorageKeys::SESSION_META).await? else {
            debug!("Local access token present without session metadata");
            return Ok(None);
        };
        let meta: LocalSessionMeta = serde_json::from_str(&meta)
            .map_err(|e| StorageError::Encoding(format!("session metadata: {}", e)))?;
        let refresh_token = self
            .local
            .get(StorageKeys::REFRESH_TOKEN)
            .await?
            .filter(|token| !token.is_empty());

        Ok(Some(meta.into_session(access_token, refresh_token)))
    }

    /// Store `session` locally, or clear the local copy when `None`.
    pub async fn write_local(&self, session: Option<&Session>) -> WriteOutcome {
        let before = self.read_local().await;

        let result = match session {
            Some(session) => self.try_write_local(session).await,
            None => self.try_clear_local().await.map_err(|err| (err, false)),
        };

        let outcome = match result {
            Ok(()) if session.is_some() => WriteOutcome::Written,
            Ok(()) => WriteOutcome::Cleared,
            Err((err, touched)) => {
                warn!(error = %err, clearing = session.is_none(), touched, "Local write failed");
                if touched {
                    // Never leave a token paired with another session's metadata.
                    if let Err(err) = self.try_clear_local().await {
                        warn!(error = %err, "Local cleanup after failed write also failed");
                    }
                }
                WriteOutcome::Failed
            }
        };

        let after = match outcome {
            WriteOutcome::Written => session.cloned(),
            WriteOutcome::Cleared => None,
            WriteOutcome::Failed => self.read_local().await,
        };
        self.notify(Backend::Local, before.as_ref(), after.as_ref());
        outcome
    }

    /// On failure, the flag tells whether any entry was already replaced.
    async fn try_write_local(&self, session: &Session) -> Result<(), (StorageError, bool)> {
        let meta = serde_json::to_string(&LocalSessionMeta::from_session(session))
            .map_err(|err| (StorageError::from(err), false))?;
        self.local
            .set(StorageKeys::SESSION_META, &meta)
            .await
            .map_err(|err| (err, false))?;

        let rest = async {
            match &session.refresh_token {
                Some(refresh_token) => {
                    self.local
                        .set(StorageKeys::REFRESH_TOKEN, refresh_token)
                        .await?
                }
                None => {
                    self.local.delete(StorageKeys::REFRESH_TOKEN).await?;
                }
            }
            // The token goes last: its presence marks the entry set complete.
            self.local
                .set(StorageKeys::ACCESS_TOKEN, &session.access_token)
                .await
        };
        rest.await.map_err(|err| (err, true))
    }

    async fn try_clear_local(&self) -> StorageResult<()> {
        // Token first, so a partial clear already reads as signed out.
        let mut first_error = None;
        for key in StorageKeys::ALL {
            if let Err(err) = self.local.delete(key).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ==========================================
    // Remote backend
    // ==========================================

    pub async fn read_remote(&self) -> Option<Session> {
        match self.read_remote_cookies().await {
            Ok(cookies) => {
                let session = decode_session(&cookies);
                if session.is_none() && cookies != RemoteCookies::default() {
                    debug!("Remote cookies present but do not form a session");
                }
                session
            }
            Err(err) => {
                warn!(error = %err, "Remote session unreadable, treating as absent");
                None
            }
        }
    }

    async fn read_remote_cookies(&self) -> StorageResult<RemoteCookies> {
        Ok(RemoteCookies {
            auth_token: self.cookies.get(CookieNames::AUTH_TOKEN).await?,
            refresh_token: self.cookies.get(CookieNames::REFRESH_TOKEN).await?,
            user: self.cookies.get(CookieNames::USER).await?,
            is_authenticated: self.cookies.get(CookieNames::IS_AUTHENTICATED).await?,
        })
    }

    /// Store `session` as the web application's cookies, or clear them when `None`.
    pub async fn write_remote(&self, session: Option<&Session>) -> WriteOutcome {
        let before = self.read_remote().await;

        let cookies = match session {
            Some(session) => self.policy.session_cookies(session, Utc::now()),
            None => self.policy.removal_cookies(),
        };
        let result = self.set_cookies(cookies).await;

        let outcome = match result {
            Ok(()) if session.is_some() => WriteOutcome::Written,
            Ok(()) => WriteOutcome::Cleared,
            Err(err) => {
                warn!(error = %err, clearing = session.is_none(), "Remote write failed");
                if session.is_some() {
                    if let Err(err) = self.remove_cookies().await {
                        warn!(error = %err, "Remote cleanup after failed write also failed");
                    }
                }
                WriteOutcome::Failed
            }
        };

        let after = match outcome {
            WriteOutcome::Cleared => None,
            WriteOutcome::Written | WriteOutcome::Failed => self.read_remote().await,
        };
        self.notify(Backend::Remote, before.as_ref(), after.as_ref());
        outcome
    }

    async fn set_cookies(&self, cookies: Vec<cookie::Cookie<'static>>) -> StorageResult<()> {
        let mut first_error = None;
        for cookie in cookies {
            let name = cookie.name().to_string();
            if let Err(err) = self.cookies.set(cookie).await {
                debug!(cookie = %name, error = %err, "Cookie write failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drop every session cookie by name.
    async fn remove_cookies(&self) -> StorageResult<()> {
        let mut first_error = None;
        for name in CookieNames::ALL {
            if let Err(err) = self.cookies.remove(name).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ==========================================
    // Both
    // ==========================================

    /// Read both backends concurrently.
    pub async fn snapshot(&self) -> CredentialSnapshot {
        let (local, remote) = tokio::join!(self.read_local(), self.read_remote());
        CredentialSnapshot { local, remote }
    }

    fn notify(&self, backend: Backend, before: Option<&Session>, after: Option<&Session>) {
        let subject_before = before.map(|s| s.subject.as_str());
        let subject_after = after.map(|s| s.subject.as_str());
        if subject_before == subject_after {
            return;
        }

        let event = AuthStateChanged {
            backend,
            authenticated: after.is_some(),
            subject: subject_after.map(str::to_string),
        };
        info!(
            backend = %backend,
            authenticated = event.authenticated,
            subject = ?event.subject,
            "Auth state changed"
        );
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}
