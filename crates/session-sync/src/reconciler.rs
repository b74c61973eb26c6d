//! One synchronization pass over the local and remote session copies.
//!
//! ## Pass lifecycle
//!
//! ```text
//! Idle ──Begin──► Reading ──SnapshotRead──► Validating ──Decided──► Writing
//!  ▲                 │                          │                     │
//!  └──────Abort──────┴──────────Abort───────────┘                     │
//!  └───────────────────────────Finished───────────────────────────────┘
//! ```
//!
//! A pass is in progress whenever the machine is not `Idle`; a second
//! `reconcile()` in that window returns [`ReconcileOutcome::Skipped`].

use crate::{AuthError, AuthResult, SessionValidator};
use credential_storage::{Backend, CredentialStore, Session, WriteOutcome};
use futures_util::FutureExt;
use parking_lot::Mutex;
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use sync_config_and_utils::DEFAULT_FRESHNESS_WINDOW_SECS;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub pass_machine(Idle)

    Idle => {
        Begin => Reading
    },
    Reading => {
        SnapshotRead => Validating,
        Abort => Idle
    },
    Validating => {
        Decided => Writing,
        Abort => Idle
    },
    Writing => {
        Finished => Idle,
        Abort => Idle
    }
}

pub use pass_machine::Input as PassInput;
pub use pass_machine::State as PassState;
pub use pass_machine::StateMachine as PassMachine;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileOutcome {
    /// Neither copy was valid; both were cleared.
    BothCleared,
    /// The remote copy was overwritten with the local session.
    SyncedToLocal,
    /// The local copy was overwritten with the remote session.
    SyncedToRemote,
    /// Nothing to do.
    AlreadyInSync,
    /// Another pass was in progress.
    Skipped,
    /// The pass failed unexpectedly.
    Error,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::BothCleared => "both-cleared",
            ReconcileOutcome::SyncedToLocal => "synced-to-local",
            ReconcileOutcome::SyncedToRemote => "synced-to-remote",
            ReconcileOutcome::AlreadyInSync => "already-in-sync",
            ReconcileOutcome::Skipped => "skipped",
            ReconcileOutcome::Error => "error",
        }
    }

    /// True when the pass ran to completion.
    pub fn is_completed(&self) -> bool {
        !matches!(self, ReconcileOutcome::Skipped | ReconcileOutcome::Error)
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct SyncStamp {
    at: Instant,
    wall: chrono::DateTime<chrono::Utc>,
}

/// Returns the machine to `Idle` however the pass ends, including when the
/// pass future is dropped or unwinds.
struct PassGuard<'a> {
    machine: &'a Mutex<PassMachine>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut machine = self.machine.lock();
        let input = match machine.state() {
            PassState::Idle => return,
            PassState::Writing => PassInput::Finished,
            _ => PassInput::Abort,
        };
        if machine.consume(&input).is_err() {
            *machine = PassMachine::new();
        }
    }
}

/// Converges the local and remote session copies.
pub struct Reconciler {
    store: Arc<CredentialStore>,
    validator: Arc<SessionValidator>,
    machine: Mutex<PassMachine>,
    last_sync: Mutex<Option<SyncStamp>>,
    freshness_window: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<CredentialStore>, validator: Arc<SessionValidator>) -> Self {
        Self::with_freshness_window(
            store,
            validator,
            Duration::from_secs(DEFAULT_FRESHNESS_WINDOW_SECS),
        )
    }

    pub fn with_freshness_window(
        store: Arc<CredentialStore>,
        validator: Arc<SessionValidator>,
        freshness_window: Duration,
    ) -> Self {
        Self {
            store,
            validator,
            machine: Mutex::new(PassMachine::new()),
            last_sync: Mutex::new(None),
            freshness_window,
        }
    }

    /// Current pass state; anything but `Idle` means a pass is running.
    pub fn state(&self) -> PassState {
        self.machine.lock().state().clone()
    }

    pub fn is_in_progress(&self) -> bool {
        self.state() != PassState::Idle
    }

    /// Wall-clock time the last completed pass finished.
    pub fn last_sync(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_sync.lock().map(|stamp| stamp.wall)
    }

    /// True when a pass completed within the freshness window.
    pub fn is_fresh(&self) -> bool {
        self.last_sync
            .lock()
            .is_some_and(|stamp| stamp.at.elapsed() < self.freshness_window)
    }

    /// Run a pass unless one completed within the freshness window.
    pub async fn reconcile_if_stale(&self) -> Option<ReconcileOutcome> {
        if self.is_fresh() {
            debug!("Sessions recently reconciled, skipping");
            return None;
        }
        Some(self.reconcile().await)
    }

    /// Run one reconciliation pass.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let Some(guard) = self.begin() else {
            debug!("Reconciliation already in progress, skipping");
            return ReconcileOutcome::Skipped;
        };

        let outcome = match AssertUnwindSafe(self.run_pass()).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                error!(error = %err, "Reconciliation pass failed");
                ReconcileOutcome::Error
            }
            Err(_) => {
                error!("Reconciliation pass panicked");
                ReconcileOutcome::Error
            }
        };
        drop(guard);

        if outcome.is_completed() {
            *self.last_sync.lock() = Some(SyncStamp {
                at: Instant::now(),
                wall: chrono::Utc::now(),
            });
        }
        info!(outcome = %outcome, "Reconciliation pass finished");
        outcome
    }

    fn begin(&self) -> Option<PassGuard<'_>> {
        let mut machine = self.machine.lock();
        machine.consume(&PassInput::Begin).ok()?;
        Some(PassGuard {
            machine: &self.machine,
        })
    }

    fn advance(&self, input: PassInput) -> AuthResult<()> {
        let mut machine = self.machine.lock();
        machine.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                machine.state()
            ))
        })?;
        Ok(())
    }

    async fn run_pass(&self) -> AuthResult<ReconcileOutcome> {
        let snapshot = self.store.snapshot().await;
        self.advance(PassInput::SnapshotRead)?;

        let local = snapshot.local;
        let remote = snapshot.remote;
        let (local_valid, remote_valid) = tokio::join!(
            self.validator.is_valid(local.as_ref()),
            self.validator.is_valid(remote.as_ref()),
        );
        debug!(local_valid, remote_valid, "Validated session copies");
        self.advance(PassInput::Decided)?;

        let outcome = match (local, remote) {
            (Some(local), Some(remote)) if local_valid && remote_valid => {
                self.converge(&local, &remote).await
            }
            (_, Some(remote)) if remote_valid => {
                self.write(Backend::Local, Some(&remote)).await;
                ReconcileOutcome::SyncedToRemote
            }
            (Some(local), _) if local_valid => {
                self.write(Backend::Remote, Some(&local)).await;
                ReconcileOutcome::SyncedToLocal
            }
            (None, None) => ReconcileOutcome::AlreadyInSync,
            _ => {
                tokio::join!(self.write(Backend::Local, None), self.write(Backend::Remote, None));
                ReconcileOutcome::BothCleared
            }
        };
        Ok(outcome)
    }

    /// Both copies valid: the newer one wins; a tie leaves both untouched.
    async fn converge(&self, local: &Session, remote: &Session) -> ReconcileOutcome {
        debug!(
            local_updated_at = %local.updated_at,
            remote_updated_at = %remote.updated_at,
            "Comparing session copies"
        );
        match local.updated_at.cmp(&remote.updated_at) {
            Ordering::Greater => {
                self.write(Backend::Remote, Some(local)).await;
                ReconcileOutcome::SyncedToLocal
            }
            Ordering::Less => {
                self.write(Backend::Local, Some(remote)).await;
                ReconcileOutcome::SyncedToRemote
            }
            Ordering::Equal => ReconcileOutcome::AlreadyInSync,
        }
    }

    /// Best-effort write; a failure is logged and left for the next pass.
    async fn write(&self, backend: Backend, session: Option<&Session>) -> WriteOutcome {
        let outcome = match backend {
            Backend::Local => self.store.write_local(session).await,
            Backend::Remote => self.store.write_remote(session).await,
        };
        if !outcome.is_success() {
            warn!(backend = %backend, clearing = session.is_none(), "Reconciliation write failed");
        }
        outcome
    }
}
