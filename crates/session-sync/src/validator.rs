//! Decides whether a single session is usable.

use crate::introspection::{TokenIntrospector, TokenStatus};
use chrono::{DateTime, Utc};
use credential_storage::{Provider, Session};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use sync_config_and_utils::DEFAULT_INTROSPECTION_TIMEOUT_SECS;
use tracing::{debug, warn};

/// Verdicts kept for fail-open decisions.
const MAX_REMEMBERED_VERDICTS: usize = 256;

/// Issuer answer for one introspection, or `None` when there was none.
type Probe = Shared<BoxFuture<'static, Option<TokenStatus>>>;

/// Validates sessions locally and, for Google tokens, with the issuer.
///
/// Issuer checks fail open: a timeout or transport error reuses the last
/// verdict recorded for that token, or accepts the token when none exists.
/// Only an explicit rejection invalidates it.
pub struct SessionValidator {
    introspector: Arc<dyn TokenIntrospector>,
    timeout: Duration,
    verdicts: Mutex<HashMap<String, bool>>,
    in_flight: Mutex<HashMap<String, Probe>>,
}

impl SessionValidator {
    pub fn new(introspector: Arc<dyn TokenIntrospector>) -> Self {
        Self::with_timeout(
            introspector,
            Duration::from_secs(DEFAULT_INTROSPECTION_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(introspector: Arc<dyn TokenIntrospector>, timeout: Duration) -> Self {
        Self {
            introspector,
            timeout,
            verdicts: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_valid(&self, session: Option<&Session>) -> bool {
        let Some(session) = session else {
            return false;
        };
        if !self.is_valid_at(Some(session), Utc::now()) {
            return false;
        }
        match session.provider {
            Provider::Google => self.check_with_issuer(&session.access_token).await,
            _ => true,
        }
    }

    /// The local checks only, evaluated at `now`.
    pub fn is_valid_at(&self, session: Option<&Session>, now: DateTime<Utc>) -> bool {
        let Some(session) = session else {
            return false;
        };
        if session.access_token.is_empty() {
            return false;
        }
        if session.is_expired_at(now) {
            debug!(subject = %session.subject, expires_at = ?session.expires_at, "Session expired");
            return false;
        }
        !session.subject.is_empty()
    }

    async fn check_with_issuer(&self, access_token: &str) -> bool {
        let probe = self.probe(access_token);
        let status = probe.clone().await;
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight
                .get(access_token)
                .is_some_and(|current| current.ptr_eq(&probe))
            {
                in_flight.remove(access_token);
            }
        }

        match status {
            Some(TokenStatus::Active) => {
                self.remember(access_token, true);
                true
            }
            Some(TokenStatus::Revoked) => {
                self.remember(access_token, false);
                false
            }
            None => {
                let last = self.verdicts.lock().get(access_token).copied();
                debug!(last_verdict = ?last, "Issuer unreachable, failing open");
                last.unwrap_or(true)
            }
        }
    }

    /// Join the in-flight introspection for `access_token`, or start one.
    fn probe(&self, access_token: &str) -> Probe {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(access_token) {
            return existing.clone();
        }

        let introspector = self.introspector.clone();
        let timeout = self.timeout;
        let token = access_token.to_string();
        let probe = async move {
            let call = AssertUnwindSafe(introspector.introspect(&token)).catch_unwind();
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(Ok(status))) => Some(status),
                Ok(Ok(Err(err))) => {
                    warn!(error = %err, transient = err.is_transient(), "Token introspection failed");
                    None
                }
                Ok(Err(_)) => {
                    warn!("Token introspection panicked");
                    None
                }
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "Token introspection timed out");
                    None
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(access_token.to_string(), probe.clone());
        probe
    }

    fn remember(&self, access_token: &str, verdict: bool) {
        let mut verdicts = self.verdicts.lock();
        if verdicts.len() >= MAX_REMEMBERED_VERDICTS && !verdicts.contains_key(access_token) {
            verdicts.clear();
        }
        verdicts.insert(access_token.to_string(), verdict);
    }
}
