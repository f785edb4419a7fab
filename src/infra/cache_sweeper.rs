//! Periodic deletion of expired shared-tier entries.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{SharedStore, StoreError};

/// Run one purge pass, logging the outcome.
pub async fn sweep_once(store: &dyn SharedStore) -> Result<u64, StoreError> {
    match store.purge_expired().await {
        Ok(0) => {
            debug!(target = "hybrid_cache::sweeper", "no expired entries");
            Ok(0)
        }
        Ok(deleted) => {
            info!(
                target = "hybrid_cache::sweeper",
                deleted, "purged expired cache entries"
            );
            Ok(deleted)
        }
        Err(err) => {
            warn!(
                target = "hybrid_cache::sweeper",
                error = %err,
                "failed to purge expired cache entries"
            );
            Err(err)
        }
    }
}

/// Spawn a task that purges expired entries every `every`, skipping the
/// immediate first tick. Abort the handle to stop it.
pub fn spawn_sweeper(store: Arc<dyn SharedStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let _ = sweep_once(store.as_ref()).await;
        }
    })
}
