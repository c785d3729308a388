use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::PersistenceStore;
use crate::task::BackgroundTask;

/// Reap expired cache entries every `every`, starting immediately.
///
/// Sweep failures are logged and the next tick tries again.
pub fn spawn_sweeper(store: Arc<PersistenceStore>, every: Duration) -> BackgroundTask {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval_secs = every.as_secs(), "Cache sweeper started");

        loop {
            ticker.tick().await;
            if let Err(e) = store.clear_expired_cache().await {
                warn!(error = %e, "Cache sweep failed");
            }
        }
    });

    BackgroundTask::new("cache-sweeper", task)
}
