//! The scheduler: a process-wide ticker that enqueues due feeds and sweeps
//! expired Invalid records (spec §4.5). Grounded on the `tokio::time::interval`
//! ticker pattern in `pipeline.rs`'s `start_aggregation_worker`.

use crate::cache::Cache;
use crate::config::{INVALID_DURATION, POLL_FREQUENCY};
use crate::store::Store;
use crate::worker::Queue;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::interval;
use tracing::{error, info, warn};

/// Spawns the tick loop and the sweep loop, both driven off `POLL_FREQUENCY`.
pub fn spawn(store: Arc<Store>, cache: Arc<Cache>, queue: Arc<Queue>) {
    tokio::spawn(tick_loop(store.clone(), queue));
    tokio::spawn(sweep_loop(store, cache));
}

async fn tick_loop(store: Arc<Store>, queue: Arc<Queue>) {
    let mut ticker = interval(POLL_FREQUENCY);
    loop {
        ticker.tick().await;
        let horizon = Utc::now() + ChronoDuration::from_std(POLL_FREQUENCY).expect("fixed positive constant")
            + ChronoDuration::seconds(1);

        let due = match store.due_urls(horizon).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "store failure fetching due urls, skipping tick");
                continue;
            }
        };

        let mut enqueued = 0;
        for url in &due {
            if !queue.try_enqueue(url) {
                info!(enqueued, due = due.len(), "queue full, stopping enqueue for this tick");
                break;
            }
            enqueued += 1;
        }
        if enqueued > 0 {
            info!(enqueued, due = due.len(), "tick enqueued due feeds");
        }
    }
}

/// Removes Invalid records older than `invalidDuration` and clears their
/// cache markers, allowing retry (spec §4.5).
async fn sweep_loop(store: Arc<Store>, cache: Arc<Cache>) {
    let mut ticker = interval(POLL_FREQUENCY);
    loop {
        ticker.tick().await;
        let threshold = Utc::now() - ChronoDuration::from_std(INVALID_DURATION).expect("fixed positive constant");

        let swept = match store.sweep_invalids_older_than(threshold).await {
            Ok(swept) => swept,
            Err(e) => {
                error!(error = %e, "store failure sweeping invalids");
                continue;
            }
        };

        for invalid in &swept {
            if let Err(e) = cache.remove_invalid(&invalid.url).await {
                warn!(url = %invalid.url, error = %e, "cache failure clearing swept invalid");
            }
        }
        if !swept.is_empty() {
            info!(count = swept.len(), "swept expired invalids");
        }
    }
}

