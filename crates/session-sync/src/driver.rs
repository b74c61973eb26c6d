//! Periodic reconciliation driver.

use crate::AuthService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Run a pass immediately, then one per `period`, until `shutdown` fires
/// or its sender is dropped.
pub fn spawn_sync_loop(
    service: Arc<AuthService>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Session sync loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = service.reconcile().await;
                    debug!(outcome = %outcome, "Periodic reconciliation");
                }
                _ = shutdown.recv() => {
                    info!("Session sync loop shutting down");
                    break;
                }
            }
        }
    })
}
