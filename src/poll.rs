//! The persistence state machine for one polled feed (spec §4.7) and the
//! invalid path that surrounds it (spec §7). This is `PollFeed` minus the
//! dequeue/dedup bookkeeping, which belongs to the worker pool.

use crate::cache::Cache;
use crate::config::INVALID_DURATION;
use crate::error::{AggregatorError, Result};
use crate::fetcher::Fetcher;
use crate::model::Feed;
use crate::normalize;
use crate::store::Store;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, error, info, warn};

/// Fetch, normalize, persist, and refresh the cache snapshot for `url`. All
/// failures are handled locally and logged; this never returns an error to
/// its caller, matching the "component failures are local" disposition.
pub async fn poll_feed(store: &Store, cache: &Cache, fetcher: &Fetcher, url: &str) {
    let outcome = fetch_and_normalize(fetcher, url).await;

    match outcome {
        Ok(feed) => match persist(store, &feed).await {
            Ok(Some(feed_id)) => {
                clear_invalid(store, cache, url).await;
                refresh_snapshot(store, cache, &feed.url, feed_id).await;
            }
            Ok(None) => {
                clear_invalid(store, cache, url).await;
                debug!(url, "alias branch: no snapshot update for this URL");
            }
            Err(e) => error!(url, error = %e, "store failure, abandoning this poll cycle"),
        },
        Err(e) => handle_invalid(store, cache, url, &e).await,
    }
}

/// Invalid is a single row per URL, removed on success (spec §9) — a feed
/// that now polls cleanly must not stay excluded from `due_urls`'s
/// `LEFT JOIN invalids` filter, nor keep a stale cache marker.
async fn clear_invalid(store: &Store, cache: &Cache, url: &str) {
    if let Err(e) = store.remove_invalid(url).await {
        error!(url, error = %e, "store failure removing invalid record on success");
    }
    if let Err(e) = cache.remove_invalid(url).await {
        warn!(url, error = %e, "cache failure clearing invalid marker on success");
    }
}

async fn fetch_and_normalize(fetcher: &Fetcher, url: &str) -> Result<Feed> {
    let bytes = fetcher.fetch(url).await?;
    normalize::normalize(url, &bytes, Utc::now())
}

/// Runs the §4.7 transitions and returns the feed id to re-read and cache,
/// or `None` when the alias branch fired (no snapshot change for this URL).
async fn persist(store: &Store, feed: &Feed) -> Result<Option<uuid::Uuid>> {
    let existing = store.find_feed_by_url(&feed.url).await?;
    let duplicate = store.find_feed_by_sum(&feed.sum).await?;

    let is_alias = match (&existing, &duplicate) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(e), Some(d)) => e.id != d.id,
    };

    if is_alias {
        let duplicate = duplicate.expect("checked above");
        create_alias(store, &feed.url, &duplicate.url, existing.is_some()).await?;
        return Ok(None);
    }

    match existing {
        None => {
            let id = store.insert_feed(feed).await?;
            info!(url = %feed.url, "created feed");
            Ok(Some(id))
        }
        Some(existing) => {
            update_feed(store, feed, &existing).await?;
            Ok(Some(existing.id))
        }
    }
}

/// `CreateAlias(new, orig, deleteAlias)`: records `new -> orig` (skipped if
/// they're equal), writes it to the cache, and — if `delete_alias` — cascades
/// a delete of the Feed previously stored at `new` (its incoming aliases,
/// its items, then itself).
async fn create_alias(
    store: &Store,
    new_url: &str,
    orig_url: &str,
    delete_alias: bool,
) -> Result<()> {
    if new_url != orig_url {
        store.insert_alias(new_url, orig_url).await?;
    }

    if delete_alias {
        if let Some(stale) = store.find_feed_by_url(new_url).await? {
            store.delete_aliases_pointing_to(&stale.url).await?;
            store.delete_items_of_feed(stale.id).await?;
            store.delete_feed(stale.id).await?;
        }
    }

    info!(alias = new_url, original = orig_url, "recorded alias");
    Ok(())
}

async fn update_feed(store: &Store, incoming: &Feed, existing: &Feed) -> Result<()> {
    let mut feed = incoming.clone();
    feed.id = existing.id;
    feed.created_at = existing.created_at;
    store.save_feed(&feed).await?;

    let guid_to_id: std::collections::HashMap<&str, uuid::Uuid> = existing
        .items
        .iter()
        .map(|i| (i.guid.as_str(), i.id))
        .collect();

    for item in &incoming.items {
        match guid_to_id.get(item.guid.as_str()) {
            Some(&id) => {
                let mut item = item.clone();
                item.id = id;
                store.save_item(&item).await?;
            }
            None => {
                store.insert_item(existing.id, item).await?;
            }
        }
    }
    Ok(())
}

async fn refresh_snapshot(store: &Store, cache: &Cache, url: &str, feed_id: uuid::Uuid) {
    match store.find_feed_by_url(url).await {
        Ok(Some(feed)) => match serde_json::to_string(&feed) {
            Ok(json) => {
                if let Err(e) = cache.set_feed(url, &json).await {
                    warn!(url, error = %e, "cache failure refreshing snapshot");
                }
            }
            Err(e) => error!(url, error = %e, "failed to serialize feed snapshot"),
        },
        Ok(None) => error!(url, feed_id = %feed_id, "feed vanished immediately after persist"),
        Err(e) => error!(url, error = %e, "store failure re-reading persisted feed"),
    }
}

/// FetchFailure / ParseFailure / EmptyFeed disposition (spec §7): if no
/// Feed exists yet for `url`, mark it invalid with a 7-day TTL; otherwise
/// push its `next_poll_at` out rather than delete it.
async fn handle_invalid(store: &Store, cache: &Cache, url: &str, err: &AggregatorError) {
    warn!(url, error = %err, "poll failed");

    match store.find_feed_by_url(url).await {
        Ok(Some(existing)) => {
            if let Err(e) = store
                .push_next_poll_at(existing.id, ChronoDuration::from_std(INVALID_DURATION).expect("fixed positive constant"))
                .await
            {
                error!(url, error = %e, "store failure pushing next_poll_at");
            }
        }
        Ok(None) => {
            if let Err(e) = cache.set_sentinel(url, "false").await {
                warn!(url, error = %e, "cache failure setting invalid sentinel");
            }
            if let Err(e) = cache
                .expire(url, INVALID_DURATION.as_secs() as i64)
                .await
            {
                warn!(url, error = %e, "cache failure setting invalid sentinel expiry");
            }
            if let Err(e) = cache.add_invalid(url).await {
                warn!(url, error = %e, "cache failure adding to invalid set");
            }
            if let Err(e) = store.insert_invalid(url, &err.to_string()).await {
                error!(url, error = %e, "store failure recording invalid");
            }
        }
        Err(e) => error!(url, error = %e, "store failure looking up feed on invalid path"),
    }
}
