use std::sync::Arc;
use std::time::Duration;

use chatter_api::AppState;
use chrono::Utc;
use tracing::{info, warn};

/// Background task that deletes expired sessions.
///
/// Expired sessions are already rejected on lookup, so this only keeps the
/// table from growing.
pub async fn run_session_prune_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let state = Arc::clone(&state);
        match tokio::task::spawn_blocking(move || state.db.prune_expired_sessions(Utc::now())).await
        {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired sessions", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
