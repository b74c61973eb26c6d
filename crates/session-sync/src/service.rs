//! Consolidated authentication service.

use crate::callback::expiry_after;
use crate::introspection::{GoogleTokenInfo, TokenIntrospector};
use crate::refresh::{refresh_with_backoff, OAuthRefresher, RefreshConfig, TokenRefresher};
use crate::{AuthError, AuthResult, ReconcileOutcome, Reconciler, SessionValidator};
use chrono::Utc;
use credential_storage::{
    AuthStateChanged, CookiePolicy, CredentialStore, FileCookieJar, FileStorage, Session,
    WriteOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use sync_config_and_utils::{Config, Paths, DEFAULT_RECONCILE_INTERVAL_SECS};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Sign-in, sign-out, authentication checks and reconciliation behind one API.
pub struct AuthService {
    store: Arc<CredentialStore>,
    validator: Arc<SessionValidator>,
    reconciler: Reconciler,
    refresher: Arc<dyn TokenRefresher>,
    refresh_config: RefreshConfig,
    sync_interval: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<CredentialStore>,
        validator: Arc<SessionValidator>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let reconciler = Reconciler::new(store.clone(), validator.clone());
        Self {
            store,
            validator,
            reconciler,
            refresher,
            refresh_config: RefreshConfig::default(),
            sync_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
        }
    }

    /// Load `config.json` under `paths` (defaults when absent) and build from it.
    pub fn load(paths: &Paths) -> AuthResult<Self> {
        let config = Config::load(paths)?;
        Self::from_config(&config, paths)
    }

    /// File-backed store, Google introspection and OAuth refresh, all from `config`.
    pub fn from_config(config: &Config, paths: &Paths) -> AuthResult<Self> {
        let store = Arc::new(CredentialStore::new(
            Arc::new(FileStorage::new(paths.local_store_file())),
            Arc::new(FileCookieJar::new(paths.cookie_file())),
            CookiePolicy::from_config(config)?,
        ));
        let introspector: Arc<dyn TokenIntrospector> =
            Arc::new(GoogleTokenInfo::from_config(config)?);
        let validator = Arc::new(SessionValidator::with_timeout(
            introspector,
            config.introspection_timeout(),
        ));
        let refresher = Arc::new(OAuthRefresher::from_config(config)?);
        let reconciler = Reconciler::with_freshness_window(
            store.clone(),
            validator.clone(),
            config.freshness_window(),
        );

        Ok(Self {
            store,
            validator,
            reconciler,
            refresher,
            refresh_config: RefreshConfig::default(),
            sync_interval: config.reconcile_interval(),
        })
    }

    pub fn with_refresh_config(mut self, refresh_config: RefreshConfig) -> Self {
        self.refresh_config = refresh_config;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Period for [`crate::spawn_sync_loop`].
    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    /// Store a freshly issued session locally.
    ///
    /// The remote copy follows on the next reconciliation pass.
    pub async fn sign_in(&self, session: Session) -> AuthResult<()> {
        if session.access_token.trim().is_empty() {
            return Err(AuthError::InvalidSession("empty access token".to_string()));
        }
        if session.subject.trim().is_empty() {
            return Err(AuthError::InvalidSession("empty subject".to_string()));
        }

        match self.store.write_local(Some(&session)).await {
            WriteOutcome::Failed => Err(AuthError::StorageWrite("local session".to_string())),
            _ => {
                info!(subject = %session.subject, provider = %session.provider, "Signed in");
                Ok(())
            }
        }
    }

    /// Clear both copies. Both writes are attempted even if one fails.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let (local, remote) = tokio::join!(
            self.store.write_local(None),
            self.store.write_remote(None)
        );
        match (local.is_success(), remote.is_success()) {
            (true, true) => {
                info!("Signed out");
                Ok(())
            }
            (false, _) => Err(AuthError::StorageWrite("clearing local session".to_string())),
            (_, false) => Err(AuthError::StorageWrite("clearing remote session".to_string())),
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.validator
            .is_valid(self.store.read_local().await.as_ref())
            .await
    }

    /// The local session, if it is currently valid.
    pub async fn current_session(&self) -> Option<Session> {
        let session = self.store.read_local().await?;
        if self.validator.is_valid(Some(&session)).await {
            Some(session)
        } else {
            None
        }
    }

    pub async fn reconcile(&self) -> ReconcileOutcome {
        self.reconciler.reconcile().await
    }

    pub async fn reconcile_if_stale(&self) -> Option<ReconcileOutcome> {
        self.reconciler.reconcile_if_stale().await
    }

    /// Refresh the local session's access token once it has expired.
    ///
    /// An unexpired session is returned as-is. A rejected refresh clears the
    /// local session; exhausted transient retries leave it in place, as does
    /// a response whose `expires_in` is out of range.
    pub async fn refresh_local(&self) -> AuthResult<Session> {
        let session = self.store.read_local().await.ok_or(AuthError::NotLoggedIn)?;
        if !session.is_expired_at(Utc::now()) {
            return Ok(session);
        }
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or(AuthError::SessionExpired)?;

        info!(subject = %session.subject, "Session expired, attempting refresh");
        let tokens =
            match refresh_with_backoff(self.refresher.as_ref(), &self.refresh_config, &refresh_token)
                .await
            {
                Ok(tokens) => tokens,
                Err(err @ AuthError::RefreshExhausted(_)) => return Err(err),
                Err(err) => {
                    warn!(error = %err, "Refresh rejected, clearing local session");
                    self.store.write_local(None).await;
                    return Err(err);
                }
            };

        let now = Utc::now();
        let expires_at = match tokens.expires_in {
            Some(secs) => Some(expiry_after(now, secs).ok_or_else(|| {
                warn!(expires_in = secs, "Token endpoint returned an out-of-range expiry");
                AuthError::TokenRefresh("invalid expires_in".to_string())
            })?),
            None => None,
        };
        let refreshed =
            session.refreshed(tokens.access_token, tokens.refresh_token, expires_at, now);
        match self.store.write_local(Some(&refreshed)).await {
            WriteOutcome::Failed => Err(AuthError::StorageWrite("refreshed session".to_string())),
            _ => Ok(refreshed),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthStateChanged> {
        self.store.subscribe()
    }
}
