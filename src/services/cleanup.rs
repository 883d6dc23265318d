//! Cleanup service for deleting expired session rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::db::{SessionStore, Store};

/// Configuration for the cleanup service.
#[derive(Clone)]
pub struct CleanupConfig {
    /// How often to run cleanup (in seconds)
    pub interval_secs: u64,
}

/// Start the cleanup background task.
///
/// Spawns a tokio task that periodically deletes session rows whose
/// expiration has passed. Purely off the request path: live requests check
/// expiration themselves, so racing the sweeper is harmless.
pub fn start_cleanup_task(store: Arc<dyn Store>, config: CleanupConfig) {
    tokio::spawn(async move {
        info!(
            "Starting session cleanup service (interval: {} seconds)",
            config.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(config.interval_secs));

        loop {
            ticker.tick().await;

            match store.delete_sessions_expired_before(Utc::now()).await {
                Ok(0) => {}
                Ok(deleted) => info!("Deleted {} expired session rows", deleted),
                Err(e) => error!("Session cleanup error: {}", e),
            }
        }
    });
}
