#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use credential_storage::{
    CookiePolicy, CredentialStore, LocalStorage, MemoryCookieJar, MemoryStorage, Provider,
    Session, StorageResult,
};
use session_sync::{
    AuthError, AuthResult, AuthService, RefreshedTokens, SessionValidator, TokenIntrospector,
    TokenRefresher, TokenStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// How the fake issuer answers for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerScript {
    Active,
    Revoked,
    Unreachable,
    /// Never answers.
    Hang,
    /// Waits for [`ScriptedIntrospector::release`], then answers `Active`.
    Gated,
}

/// Issuer whose answers are scripted per token. Unscripted tokens are active.
pub struct ScriptedIntrospector {
    scripts: Mutex<HashMap<String, IssuerScript>>,
    calls: AtomicUsize,
    gate: Notify,
}

impl ScriptedIntrospector {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        }
    }

    pub fn script(&self, token: &str, script: IssuerScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(token.to_string(), script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let every gated introspection answer.
    pub fn release(&self) {
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl TokenIntrospector for ScriptedIntrospector {
    async fn introspect(&self, access_token: &str) -> AuthResult<TokenStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(access_token)
            .copied()
            .unwrap_or(IssuerScript::Active);

        match script {
            IssuerScript::Active => Ok(TokenStatus::Active),
            IssuerScript::Revoked => Ok(TokenStatus::Revoked),
            IssuerScript::Unreachable => Err(AuthError::NetworkUnavailable),
            IssuerScript::Hang => std::future::pending().await,
            IssuerScript::Gated => {
                self.gate.notified().await;
                Ok(TokenStatus::Active)
            }
        }
    }
}

/// Refresher that hands out a fixed result.
pub struct FakeRefresher {
    pub result: Mutex<Option<RefreshedTokens>>,
    pub calls: AtomicUsize,
}

impl FakeRefresher {
    pub fn succeeding(access_token: &str) -> Self {
        Self {
            result: Mutex::new(Some(RefreshedTokens {
                access_token: access_token.to_string(),
                refresh_token: Some("R2".to_string()),
                expires_in: Some(3600),
            })),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            result: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, _refresh_token: &str) -> AuthResult<RefreshedTokens> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::TokenRefresh("invalid_grant".to_string()))
    }
}

/// Local storage that panics on its next read once armed.
pub struct PanickingStorage {
    pub inner: MemoryStorage,
    pub armed: AtomicBool,
}

#[async_trait]
impl LocalStorage for PanickingStorage {
    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("storage context destroyed");
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(key).await
    }
}

/// An in-memory service with handles on every backend.
pub struct Harness {
    pub local: Arc<MemoryStorage>,
    pub jar: Arc<MemoryCookieJar>,
    pub store: Arc<CredentialStore>,
    pub issuer: Arc<ScriptedIntrospector>,
    pub refresher: Arc<FakeRefresher>,
    pub service: AuthService,
}

pub fn harness() -> Harness {
    harness_with_refresher(FakeRefresher::rejecting())
}

pub fn harness_with_refresher(refresher: FakeRefresher) -> Harness {
    let local = Arc::new(MemoryStorage::new());
    let jar = Arc::new(MemoryCookieJar::new());
    let store = Arc::new(CredentialStore::new(
        local.clone(),
        jar.clone(),
        CookiePolicy::default(),
    ));
    let issuer = Arc::new(ScriptedIntrospector::new());
    let validator = Arc::new(SessionValidator::new(issuer.clone()));
    let refresher = Arc::new(refresher);
    let service = AuthService::new(store.clone(), validator, refresher.clone());

    Harness {
        local,
        jar,
        store,
        issuer,
        refresher,
        service,
    }
}

impl Harness {
    /// Everything both backends hold, for before/after comparisons.
    pub fn dump(&self) -> (Vec<(String, String)>, Vec<(String, String)>) {
        let mut local: Vec<_> = self.local.entries().into_iter().collect();
        local.sort();
        (local, self.jar.values())
    }
}

pub fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// A Google session for `u1` expiring in an hour, last updated at `updated_ms`.
pub fn session(token: &str, updated_ms: i64) -> Session {
    Session::new("u1", token, Provider::Google, at(updated_ms))
        .with_expires_at(Utc::now() + Duration::hours(1))
}

/// Same as [`session`] but already expired.
pub fn expired_session(token: &str, updated_ms: i64) -> Session {
    Session::new("u1", token, Provider::Google, at(updated_ms))
        .with_expires_at(Utc::now() - Duration::minutes(1))
}
