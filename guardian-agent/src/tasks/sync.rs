//! Scheduled registration task.
//!
//! Runs until the agent holds a key; a failed attempt leaves the store
//! untouched, so the next tick simply retries.

use crate::hook::{LoginGuard, SyncOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub async fn run_sync_loop(guard: Arc<LoginGuard>) {
    let period = Duration::from_secs(guard.config().remote.sync_interval_seconds);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match guard.on_scheduled_tick().await {
            Ok(SyncOutcome::Registered) => {
                tracing::info!("Registration complete");
            }
            Ok(SyncOutcome::AlreadyRegistered) => {
                tracing::trace!("Agent already registered, nothing to do");
            }
            Err(e) => {
                tracing::error!(error = %e, "Registration attempt failed, will retry");
            }
        }
    }
}
