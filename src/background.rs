//! Background sweep of stale staged temp files.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::STAGED_SWEEP_INTERVAL_SECS;
use crate::storage::Storage;

/// Starts the periodic staged-file sweep. A zero TTL disables it.
pub fn spawn_background_tasks(storage: Arc<Storage>, staged_ttl: Duration) {
    if staged_ttl.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STAGED_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(err) = storage.sweep_staged(staged_ttl).await {
                warn!(error = %err, "staged sweep failed");
            }
        }
    });
}
