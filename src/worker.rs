//! The bounded work queue and worker pool (spec §4.6, §5). A single
//! `Queue` owns both the `queued` membership set and the bounded channel, so
//! every enqueue attempt is an atomic check+insert+try_send guarded by one
//! mutex — the "mutex-protected concurrent map" option spec §5 offers as an
//! alternative to a single-owner funnel thread.

use crate::cache::Cache;
use crate::config::{QUEUE_LIMIT, WORKER_COUNT};
use crate::fetcher::Fetcher;
use crate::poll;
use crate::store::Store;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct Queue {
    queued: Mutex<HashSet<String>>,
    tx: mpsc::Sender<String>,
}

impl Queue {
    fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                queued: Mutex::new(HashSet::new()),
                tx,
            }),
            rx,
        )
    }

    /// Attempts to enqueue `url`. Returns `false` if it is already queued or
    /// the channel is saturated — non-blocking backpressure (spec §5).
    pub fn try_enqueue(&self, url: &str) -> bool {
        let mut queued = self.queued.lock().expect("queue mutex poisoned");
        if queued.contains(url) {
            return false;
        }
        match self.tx.try_send(url.to_string()) {
            Ok(()) => {
                queued.insert(url.to_string());
                true
            }
            Err(_) => {
                debug!(url, "queue full, dropping enqueue attempt");
                false
            }
        }
    }

    fn remove(&self, url: &str) {
        self.queued.lock().expect("queue mutex poisoned").remove(url);
    }
}

/// Spawns `WORKER_COUNT` workers pulling from a shared bounded queue of
/// capacity `QUEUE_LIMIT`, returning the queue handle callers enqueue onto.
pub fn spawn(store: Arc<Store>, cache: Arc<Cache>, fetcher: Arc<Fetcher>) -> Arc<Queue> {
    let (queue, rx) = Queue::new(QUEUE_LIMIT);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    for worker_id in 0..WORKER_COUNT {
        let queue = queue.clone();
        let rx = rx.clone();
        let store = store.clone();
        let cache = cache.clone();
        let fetcher = fetcher.clone();

        tokio::spawn(async move {
            loop {
                let url = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(url) = url else {
                    info!(worker_id, "queue closed, worker exiting");
                    break;
                };
                debug!(worker_id, url = %url, "polling feed");
                poll::poll_feed(&store, &cache, &fetcher, &url).await;
                queue.remove(&url);
            }
        });
    }

    info!(worker_count = WORKER_COUNT, queue_limit = QUEUE_LIMIT, "worker pool started");
    queue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let (queue, _rx) = Queue::new(4);
        assert!(queue.try_enqueue("http://a"));
        assert!(!queue.try_enqueue("http://a"));
    }

    #[test]
    fn saturated_queue_rejects_further_enqueues() {
        let (queue, _rx) = Queue::new(2);
        assert!(queue.try_enqueue("http://a"));
        assert!(queue.try_enqueue("http://b"));
        assert!(!queue.try_enqueue("http://c"));
    }

    #[test]
    fn removal_allows_re_enqueue() {
        let (queue, _rx) = Queue::new(4);
        assert!(queue.try_enqueue("http://a"));
        queue.remove("http://a");
        assert!(queue.try_enqueue("http://a"));
    }

    /// S5 from spec §8: `queueLimit=2`, 5 distinct URLs offered in one tick.
    #[test]
    fn backpressure_matches_s5() {
        let (queue, _rx) = Queue::new(2);
        let urls = ["A", "B", "C", "D", "E"];
        let accepted: Vec<&str> = urls.into_iter().filter(|u| queue.try_enqueue(u)).collect();
        assert_eq!(accepted, vec!["A", "B"]);
        assert_eq!(queue.queued.lock().unwrap().len(), 2);
    }
}
