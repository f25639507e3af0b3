use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::errors::AppError;
use crate::services::ledger;
use crate::state::AppState;

/// Expires stale pending bookings once. Returns how many were cancelled.
pub fn sweep_once(state: &AppState) -> Result<usize, AppError> {
    let policy = state.config.ledger_policy();
    let mut db = state.db()?;
    Ok(ledger::expire_stale_pending(&mut db, &policy, Utc::now())?)
}

/// Background task that releases slots held by bookings nobody paid for.
pub async fn run_sweeper(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(state.config.sweep_interval_secs));
    loop {
        interval.tick().await;
        match sweep_once(&state) {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "swept stale pending bookings"),
            Err(e) => tracing::error!(error = %e, "pending booking sweep failed"),
        }
    }
}
